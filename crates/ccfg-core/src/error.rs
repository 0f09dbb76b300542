use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CcfgError {
    #[error("document already exists: {0} (use upsert to change its sections)")]
    DocumentExists(PathBuf),

    #[error("invalid section id '{0}': must be alphanumeric with '.', '_' or '-'")]
    InvalidSectionId(String),

    #[error("invalid section version '{0}': must be non-empty without whitespace")]
    InvalidVersion(String),

    #[error("content of section '{0}' contains a ccfg marker line")]
    MarkerInContent(String),

    #[error("section '{id}' appears {count} times in {path}; fix the markers before updating")]
    DuplicateSection {
        id: String,
        count: usize,
        path: PathBuf,
    },

    #[error("section '{id}' in {path} has a begin marker but no end marker")]
    UnterminatedSection { id: String, path: PathBuf },

    #[error("failed to parse settings {path}: {source}")]
    SettingsParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unexpected settings shape in {path}: {reason}")]
    SettingsShape { path: PathBuf, reason: String },

    #[error("invalid plugin entry '{0}': expected <plugin>@<marketplace>")]
    InvalidPluginEntry(String),

    #[error("invalid permissions declaration {path}: {source}")]
    PermissionsDeclaration {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no backups available for {0}")]
    NoBackups(PathBuf),

    #[error("no backup with timestamp {timestamp} for {path}")]
    BackupNotFound { path: PathBuf, timestamp: String },

    #[error("only one backup exists for {0}; nothing to rollback to")]
    NothingToRollback(PathBuf),

    #[error("invalid backup timestamp '{0}': expected YYYYMMDD_HHMMSS")]
    InvalidTimestamp(String),

    #[error("cannot derive a backup identity from {0}")]
    InvalidBackupSource(PathBuf),

    #[error("unknown scope '{0}'; valid: user, project")]
    InvalidScope(String),

    #[error("home directory not found: set HOME or CCFG_HOME")]
    HomeNotFound,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CcfgError>;
