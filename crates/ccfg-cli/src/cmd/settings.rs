use crate::output::print_json;
use crate::root::Workspace;
use anyhow::Context;
use ccfg_core::{
    settings::{self, MergeReport, SettingsDocument},
    types::Scope,
};
use clap::{Args, Subcommand};
use std::collections::BTreeSet;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Args, Clone)]
pub struct TargetArgs {
    /// Which settings.json to operate on
    #[arg(long, default_value_t = Scope::User)]
    pub scope: Scope,

    /// Explicit settings path (overrides --scope)
    #[arg(long)]
    pub file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum SettingsSubcommand {
    /// Print the settings document
    Show {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Union permission grants into the permissions list
    Permissions {
        /// Permission grants, e.g. "Bash(git status:*)"
        grants: Vec<String>,
        /// Also merge the grants declared in DIR/permissions.json
        #[arg(long = "from", value_name = "DIR")]
        from: Vec<PathBuf>,
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Enable plugins (plugin@marketplace)
    Plugins {
        #[arg(required = true)]
        entries: Vec<String>,
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Set a top-level flag only if it is not already set
    SetDefault {
        key: String,
        #[arg(action = clap::ArgAction::Set)]
        value: bool,
        #[command(flatten)]
        target: TargetArgs,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(ws: &Workspace, subcmd: SettingsSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        SettingsSubcommand::Show { target } => show(ws, &target),
        SettingsSubcommand::Permissions {
            grants,
            from,
            target,
        } => permissions(ws, grants, &from, &target, json),
        SettingsSubcommand::Plugins { entries, target } => plugins(ws, entries, &target, json),
        SettingsSubcommand::SetDefault { key, value, target } => {
            set_default(ws, &key, value, &target, json)
        }
    }
}

fn target_path(ws: &Workspace, target: &TargetArgs) -> PathBuf {
    ws.settings_path(target.scope, target.file.as_deref())
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

fn show(ws: &Workspace, target: &TargetArgs) -> anyhow::Result<()> {
    let path = target_path(ws, target);
    let doc = SettingsDocument::load(&path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    print!("{}", doc.to_pretty()?);
    Ok(())
}

// ---------------------------------------------------------------------------
// permissions
// ---------------------------------------------------------------------------

fn permissions(
    ws: &Workspace,
    grants: Vec<String>,
    from: &[PathBuf],
    target: &TargetArgs,
    json: bool,
) -> anyhow::Result<()> {
    let mut wanted: BTreeSet<String> = grants.into_iter().collect();
    for dir in from {
        let declared = settings::read_declared_permissions(dir)
            .with_context(|| format!("failed to read permissions declared in {}", dir.display()))?;
        if declared.is_empty() {
            tracing::info!(dir = %dir.display(), "no permissions declared");
        }
        wanted.extend(declared);
    }
    if wanted.is_empty() {
        anyhow::bail!("no permissions given: pass grants or --from DIR");
    }

    let path = target_path(ws, target);
    let report = ws.with_backup(&path, || {
        settings::merge_permissions(&path, &ws.config.settings, wanted)
            .with_context(|| format!("failed to merge permissions into {}", path.display()))
    })?;
    report_merge("permissions", &path, &report, json)
}

// ---------------------------------------------------------------------------
// plugins
// ---------------------------------------------------------------------------

fn plugins(
    ws: &Workspace,
    entries: Vec<String>,
    target: &TargetArgs,
    json: bool,
) -> anyhow::Result<()> {
    let path = target_path(ws, target);
    let report = ws.with_backup(&path, || {
        settings::merge_plugins(&path, &ws.config.settings, entries)
            .with_context(|| format!("failed to enable plugins in {}", path.display()))
    })?;
    report_merge("plugins", &path, &report, json)
}

// ---------------------------------------------------------------------------
// set-default
// ---------------------------------------------------------------------------

fn set_default(
    ws: &Workspace,
    key: &str,
    value: bool,
    target: &TargetArgs,
    json: bool,
) -> anyhow::Result<()> {
    let path = target_path(ws, target);
    let written = ws.with_backup(&path, || {
        settings::set_default_flag(&path, key, value)
            .with_context(|| format!("failed to set '{key}' in {}", path.display()))
    })?;

    if json {
        print_json(&serde_json::json!({ "key": key, "value": value, "written": written }))?;
    } else if written {
        println!("  set: {key} = {value} in {}", path.display());
    } else {
        println!("  kept: {key} already set in {}", path.display());
    }
    Ok(())
}

fn report_merge(
    what: &str,
    path: &std::path::Path,
    report: &MergeReport,
    json: bool,
) -> anyhow::Result<()> {
    if json {
        return print_json(report);
    }
    if report.added.is_empty() {
        println!("  unchanged: {what} in {} ({} total)", path.display(), report.total);
    } else {
        println!(
            "  updated: {what} in {} (+{}, {} total)",
            path.display(),
            report.added.len(),
            report.total
        );
        for entry in &report.added {
            println!("    + {entry}");
        }
    }
    Ok(())
}
