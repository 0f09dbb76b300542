use crate::output::{print_json, print_table};
use crate::root::Workspace;
use anyhow::Context;
use clap::Subcommand;
use std::path::{Path, PathBuf};

#[derive(Subcommand)]
pub enum BackupSubcommand {
    /// Snapshot a file now
    Create { file: PathBuf },

    /// List snapshots of a file, newest first
    List { file: PathBuf },

    /// Restore a snapshot (newest unless --timestamp is given)
    Restore {
        file: PathBuf,
        /// Snapshot timestamp, YYYYMMDD_HHMMSS
        #[arg(long)]
        timestamp: Option<String>,
    },

    /// Undo the last change by restoring the previous snapshot
    Rollback { file: PathBuf },

    /// Delete all but the newest snapshots
    Prune {
        file: PathBuf,
        /// How many to keep (default: backup.retain from config)
        #[arg(long)]
        keep: Option<usize>,
    },
}

pub fn run(ws: &Workspace, subcmd: BackupSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        BackupSubcommand::Create { file } => create(ws, &file, json),
        BackupSubcommand::List { file } => list(ws, &file, json),
        BackupSubcommand::Restore { file, timestamp } => {
            restore(ws, &file, timestamp.as_deref(), json)
        }
        BackupSubcommand::Rollback { file } => rollback(ws, &file, json),
        BackupSubcommand::Prune { file, keep } => prune(ws, &file, keep, json),
    }
}

fn create(ws: &Workspace, file: &Path, json: bool) -> anyhow::Result<()> {
    let created = ws
        .backups()
        .create(file)
        .with_context(|| format!("failed to back up {}", file.display()))?;
    if json {
        return print_json(&serde_json::json!({ "source": file, "backup": created }));
    }
    match created {
        Some(path) => println!("  created: {}", path.display()),
        None => println!("  skipped: {} does not exist", file.display()),
    }
    Ok(())
}

fn list(ws: &Workspace, file: &Path, json: bool) -> anyhow::Result<()> {
    let entries = ws
        .backups()
        .list(file)
        .with_context(|| format!("failed to list backups of {}", file.display()))?;
    if json {
        return print_json(&entries);
    }
    if entries.is_empty() {
        println!("No backups of {}.", file.display());
        return Ok(());
    }
    let rows = entries
        .iter()
        .map(|e| {
            vec![
                e.timestamp.clone(),
                e.size.to_string(),
                e.path.display().to_string(),
            ]
        })
        .collect();
    print_table(&["TIMESTAMP", "BYTES", "PATH"], rows);
    Ok(())
}

fn restore(ws: &Workspace, file: &Path, timestamp: Option<&str>, json: bool) -> anyhow::Result<()> {
    let from = ws
        .backups()
        .restore(file, timestamp)
        .with_context(|| format!("failed to restore {}", file.display()))?;
    if json {
        return print_json(&serde_json::json!({ "source": file, "restored_from": from }));
    }
    println!("  restored: {} from {}", file.display(), from.display());
    Ok(())
}

fn rollback(ws: &Workspace, file: &Path, json: bool) -> anyhow::Result<()> {
    let from = ws
        .backups()
        .rollback(file)
        .with_context(|| format!("failed to roll back {}", file.display()))?;
    if json {
        return print_json(&serde_json::json!({ "source": file, "restored_from": from }));
    }
    println!("  rolled back: {} to {}", file.display(), from.display());
    Ok(())
}

fn prune(ws: &Workspace, file: &Path, keep: Option<usize>, json: bool) -> anyhow::Result<()> {
    let mgr = ws.backups();
    let keep = keep.unwrap_or(mgr.retain());
    let removed = mgr
        .prune(file, keep)
        .with_context(|| format!("failed to prune backups of {}", file.display()))?;
    if json {
        return print_json(&serde_json::json!({ "source": file, "kept": keep, "removed": removed }));
    }
    println!("  pruned: {removed} backup(s) of {} (keeping {keep})", file.display());
    Ok(())
}
