use crate::output::print_json;
use crate::root::Workspace;
use anyhow::Context;
use ccfg_core::{
    config::{Config, WarnLevel},
    paths,
};
use clap::Subcommand;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Print the effective configuration
    Show,

    /// Write a default ccfg.yaml if none exists
    Init,

    /// Validate the config for common mistakes
    Validate,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(ws: &Workspace, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Show => show(ws, json),
        ConfigSubcommand::Init => init(ws),
        ConfigSubcommand::Validate => validate(ws, json),
    }
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

fn show(ws: &Workspace, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(&serde_json::json!({
            "global_root": ws.global,
            "project_root": ws.project,
            "backup_dir": ws.config.backup_dir(&ws.global),
            "config": ws.config,
        }));
    }
    println!("Global root:   {}", ws.global.display());
    println!("Project root:  {}", ws.project.display());
    println!("Backup dir:    {}", ws.config.backup_dir(&ws.global).display());
    println!();
    print!("{}", serde_yaml::to_string(&ws.config)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// init
// ---------------------------------------------------------------------------

fn init(ws: &Workspace) -> anyhow::Result<()> {
    let path = paths::config_path(&ws.global);
    if path.exists() {
        println!("  exists:  {}", path.display());
        return Ok(());
    }
    Config::default()
        .save(&ws.global)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("  created: {}", path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

fn validate(ws: &Workspace, json: bool) -> anyhow::Result<()> {
    let warnings = ws.config.validate(&ws.global);

    if json {
        let value = serde_json::json!({
            "warnings": warnings,
        });
        print_json(&value)?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    let has_errors = warnings.iter().any(|w| w.level == WarnLevel::Error);
    if has_errors {
        anyhow::bail!("config validation found errors");
    }

    Ok(())
}
