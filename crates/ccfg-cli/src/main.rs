mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    backup::BackupSubcommand, config::ConfigSubcommand, section::SectionSubcommand,
    settings::SettingsSubcommand,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "ccfg",
    about = "Manage assistant configuration: CLAUDE.md sections, settings.json merges, backups",
    version,
    propagate_version = true
)]
struct Cli {
    /// Global config root (default: ~/.claude)
    #[arg(long, global = true, env = "CCFG_HOME")]
    home: Option<PathBuf>,

    /// Project root (default: auto-detect from .claude/ or .git/)
    #[arg(long, global = true, env = "CCFG_PROJECT")]
    project: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Log debug output to stderr
    #[arg(long, global = true, short = 'v')]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage versioned sections in CLAUDE.md
    Section {
        #[command(subcommand)]
        subcommand: SectionSubcommand,
    },

    /// Merge permissions, plugins, and flags into settings.json
    Settings {
        #[command(subcommand)]
        subcommand: SettingsSubcommand,
    },

    /// Create, list, restore, roll back, and prune backups
    Backup {
        #[command(subcommand)]
        subcommand: BackupSubcommand,
    },

    /// Inspect and validate ccfg.yaml
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = root::Workspace::load(cli.home.as_deref(), cli.project.as_deref()).and_then(
        |ws| match cli.command {
            Commands::Section { subcommand } => cmd::section::run(&ws, subcommand, cli.json),
            Commands::Settings { subcommand } => cmd::settings::run(&ws, subcommand, cli.json),
            Commands::Backup { subcommand } => cmd::backup::run(&ws, subcommand, cli.json),
            Commands::Config { subcommand } => cmd::config::run(&ws, subcommand, cli.json),
        },
    );

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
