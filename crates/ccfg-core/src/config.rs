use crate::error::Result;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// SettingsKeys
// ---------------------------------------------------------------------------

/// Key names the merge engine reads and writes in `settings.json`.
///
/// `permissions` is a dotted path into nested objects; `plugins` is a single
/// top-level key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsKeys {
    #[serde(default = "default_permissions_key")]
    pub permissions_key: String,
    #[serde(default = "default_plugins_key")]
    pub plugins_key: String,
}

fn default_permissions_key() -> String {
    "permissions.allow".to_string()
}

fn default_plugins_key() -> String {
    "enabledPlugins".to_string()
}

impl Default for SettingsKeys {
    fn default() -> Self {
        Self {
            permissions_key: default_permissions_key(),
            plugins_key: default_plugins_key(),
        }
    }
}

impl SettingsKeys {
    pub fn permissions_path(&self) -> Vec<&str> {
        self.permissions_key.split('.').collect()
    }
}

// ---------------------------------------------------------------------------
// BackupConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Backup directory; defaults to `<global_root>/backups`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    #[serde(default = "default_retain")]
    pub retain: usize,
}

fn default_retain() -> usize {
    10
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            dir: None,
            retain: default_retain(),
        }
    }
}

// ---------------------------------------------------------------------------
// DocumentConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentConfig {
    /// Heading that opens the user-owned tail of a managed document. New
    /// sections are inserted above it.
    #[serde(default = "default_footer_heading")]
    pub footer_heading: String,
}

fn default_footer_heading() -> String {
    "## Project Notes".to_string()
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            footer_heading: default_footer_heading(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub settings: SettingsKeys,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub document: DocumentConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            settings: SettingsKeys::default(),
            backup: BackupConfig::default(),
            document: DocumentConfig::default(),
        }
    }
}

impl Config {
    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Load `<global>/ccfg.yaml`. A missing file yields the defaults.
    pub fn load(global: &Path) -> Result<Self> {
        let path = paths::config_path(global);
        let Some(data) = crate::io::read_if_exists(&path)? else {
            return Ok(Self::default());
        };
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, global: &Path) -> Result<()> {
        let path = paths::config_path(global);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn backup_dir(&self, global: &Path) -> PathBuf {
        match &self.backup.dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => global.join(dir),
            None => paths::default_backup_dir(global),
        }
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self, global: &Path) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.backup.retain == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "backup.retain is 0; every snapshot would be pruned immediately"
                    .to_string(),
            });
        } else if self.backup.retain > 100 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "backup.retain={} (>100 is unusual)",
                    self.backup.retain
                ),
            });
        }

        if self.settings.permissions_path().iter().any(|s| s.is_empty()) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "settings.permissions_key '{}' has an empty path segment",
                    self.settings.permissions_key
                ),
            });
        }

        if self.settings.plugins_key.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "settings.plugins_key is empty".to_string(),
            });
        }

        if self.settings.permissions_path().first() == Some(&self.settings.plugins_key.as_str())
        {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "settings.permissions_key and settings.plugins_key both use '{}'",
                    self.settings.plugins_key
                ),
            });
        }

        if !self.document.footer_heading.starts_with('#') {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "document.footer_heading '{}' is not a Markdown heading",
                    self.document.footer_heading
                ),
            });
        }

        if self.backup_dir(global) == global {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "backup.dir is the global config root; backups would mix with live files"
                    .to_string(),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
