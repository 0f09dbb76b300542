use crate::output::{print_json, print_table, print_warnings};
use crate::root::Workspace;
use anyhow::Context;
use ccfg_core::{
    section::{self, SectionSpec},
    types::Scope,
};
use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Args, Clone)]
pub struct DocArgs {
    /// Which CLAUDE.md to operate on
    #[arg(long, default_value_t = Scope::User)]
    pub scope: Scope,

    /// Explicit document path (overrides --scope)
    #[arg(long)]
    pub file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum SectionSubcommand {
    /// List managed sections and their versions
    List {
        #[command(flatten)]
        doc: DocArgs,
    },

    /// Report whether a section exists
    Has {
        id: String,
        #[command(flatten)]
        doc: DocArgs,
    },

    /// Print the version of a section
    Version {
        id: String,
        #[command(flatten)]
        doc: DocArgs,
    },

    /// Add a section, or replace it when the version differs
    Upsert {
        id: String,
        /// Section version; an identical version leaves the document alone
        #[arg(long = "section-version", value_name = "VERSION")]
        section_version: String,
        /// Section body text
        #[arg(long, conflicts_with = "content_file")]
        content: Option<String>,
        /// Read the section body from a file
        #[arg(long, value_name = "PATH")]
        content_file: Option<PathBuf>,
        #[command(flatten)]
        doc: DocArgs,
    },

    /// Create a new document from sections (fails if it exists)
    Create {
        /// Section as ID@VERSION=PATH; repeat in document order
        #[arg(long = "section", value_name = "ID@VERSION=PATH")]
        sections: Vec<String>,
        #[command(flatten)]
        doc: DocArgs,
    },

    /// Check that every begin marker has a matching end marker
    Validate {
        #[command(flatten)]
        doc: DocArgs,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(ws: &Workspace, subcmd: SectionSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        SectionSubcommand::List { doc } => list(ws, &doc, json),
        SectionSubcommand::Has { id, doc } => has(ws, &id, &doc, json),
        SectionSubcommand::Version { id, doc } => version(ws, &id, &doc, json),
        SectionSubcommand::Upsert {
            id,
            section_version,
            content,
            content_file,
            doc,
        } => upsert(ws, &id, &section_version, content, content_file.as_deref(), &doc, json),
        SectionSubcommand::Create { sections, doc } => create(ws, &sections, &doc, json),
        SectionSubcommand::Validate { doc } => validate(ws, &doc, json),
    }
}

fn doc_path(ws: &Workspace, doc: &DocArgs) -> PathBuf {
    ws.claude_md_path(doc.scope, doc.file.as_deref())
}

// ---------------------------------------------------------------------------
// list / has / version
// ---------------------------------------------------------------------------

fn list(ws: &Workspace, doc: &DocArgs, json: bool) -> anyhow::Result<()> {
    let path = doc_path(ws, doc);
    let sections =
        section::list(&path).with_context(|| format!("failed to read {}", path.display()))?;

    if json {
        return print_json(&sections);
    }
    if sections.is_empty() {
        println!("No managed sections in {}.", path.display());
        return Ok(());
    }
    let rows = sections
        .into_iter()
        .map(|s| vec![s.id, s.version])
        .collect();
    print_table(&["SECTION", "VERSION"], rows);
    Ok(())
}

fn has(ws: &Workspace, id: &str, doc: &DocArgs, json: bool) -> anyhow::Result<()> {
    let path = doc_path(ws, doc);
    let present = section::has_section(&path, id)
        .with_context(|| format!("failed to read {}", path.display()))?;
    if json {
        print_json(&serde_json::json!({ "id": id, "present": present }))?;
    } else {
        println!("{}", if present { "yes" } else { "no" });
    }
    Ok(())
}

fn version(ws: &Workspace, id: &str, doc: &DocArgs, json: bool) -> anyhow::Result<()> {
    let path = doc_path(ws, doc);
    let version = section::get_version(&path, id)
        .with_context(|| format!("failed to read {}", path.display()))?;
    if json {
        print_json(&serde_json::json!({ "id": id, "version": version }))?;
    } else if let Some(v) = version {
        println!("{v}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// upsert
// ---------------------------------------------------------------------------

fn upsert(
    ws: &Workspace,
    id: &str,
    version: &str,
    content: Option<String>,
    content_file: Option<&Path>,
    doc: &DocArgs,
    json: bool,
) -> anyhow::Result<()> {
    let body = match (content, content_file) {
        (Some(text), _) => text,
        (None, Some(file)) => std::fs::read_to_string(file)
            .with_context(|| format!("failed to read {}", file.display()))?,
        (None, None) => anyhow::bail!("one of --content or --content-file is required"),
    };
    let spec = SectionSpec::new(id, version, body)?;
    let path = doc_path(ws, doc);
    let footer = &ws.config.document.footer_heading;

    let outcome = ws.with_backup(&path, || {
        section::upsert(&path, &spec, footer)
            .with_context(|| format!("failed to upsert section '{id}' in {}", path.display()))
    })?;

    warn_on_markers(&path)?;

    if json {
        print_json(&serde_json::json!({
            "id": id,
            "version": version,
            "outcome": outcome,
            "path": path,
        }))?;
    } else {
        println!("  {outcome}: section '{id}' ({version}) in {}", path.display());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// create
// ---------------------------------------------------------------------------

/// Parse `ID@VERSION=PATH`.
fn parse_section_arg(arg: &str) -> anyhow::Result<SectionSpec> {
    let (head, file) = arg
        .split_once('=')
        .with_context(|| format!("invalid --section '{arg}': expected ID@VERSION=PATH"))?;
    let (id, version) = head
        .split_once('@')
        .with_context(|| format!("invalid --section '{arg}': expected ID@VERSION=PATH"))?;
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read section content {file}"))?;
    Ok(SectionSpec::new(id, version, content)?)
}

fn create(ws: &Workspace, sections: &[String], doc: &DocArgs, json: bool) -> anyhow::Result<()> {
    let specs = sections
        .iter()
        .map(|s| parse_section_arg(s))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let path = doc_path(ws, doc);

    section::create(&path, &specs, &ws.config.document.footer_heading)
        .with_context(|| format!("failed to create {}", path.display()))?;

    warn_on_markers(&path)?;

    if json {
        print_json(&serde_json::json!({
            "path": path,
            "sections": specs.iter().map(|s| &s.id).collect::<Vec<_>>(),
        }))?;
    } else {
        println!("  created: {} ({} sections)", path.display(), specs.len());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

fn validate(ws: &Workspace, doc: &DocArgs, json: bool) -> anyhow::Result<()> {
    let path = doc_path(ws, doc);
    let issues =
        section::validate(&path).with_context(|| format!("failed to read {}", path.display()))?;

    if json {
        print_json(&serde_json::json!({ "path": path, "issues": issues }))?;
    } else if issues.is_empty() {
        println!("Markers are balanced in {}.", path.display());
    } else {
        for issue in &issues {
            println!("[error] {issue}");
        }
    }

    if !issues.is_empty() {
        anyhow::bail!("{} marker problem(s) in {}", issues.len(), path.display());
    }
    Ok(())
}

/// Post-write integrity check. The document is already on disk, so problems
/// are reported rather than raised.
fn warn_on_markers(path: &Path) -> anyhow::Result<()> {
    let issues = section::validate(path)?;
    print_warnings(&path.display().to_string(), &issues);
    Ok(())
}
