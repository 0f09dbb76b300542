use crate::error::{CcfgError, Result};
use crate::types::Scope;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// File and directory names
// ---------------------------------------------------------------------------

pub const CLAUDE_DIR: &str = ".claude";
pub const SETTINGS_FILE: &str = "settings.json";
pub const CLAUDE_MD: &str = "CLAUDE.md";
pub const CONFIG_FILE: &str = "ccfg.yaml";
pub const BACKUPS_DIR: &str = "backups";
pub const PERMISSIONS_FILE: &str = "permissions.json";

// ---------------------------------------------------------------------------
// Root resolution
// ---------------------------------------------------------------------------

/// Resolve the global config root: an explicit path wins, otherwise
/// `~/.claude`.
pub fn global_root(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = explicit {
        return Ok(p.to_path_buf());
    }
    let home = home::home_dir().ok_or(CcfgError::HomeNotFound)?;
    Ok(home.join(CLAUDE_DIR))
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn config_path(global: &Path) -> PathBuf {
    global.join(CONFIG_FILE)
}

pub fn default_backup_dir(global: &Path) -> PathBuf {
    global.join(BACKUPS_DIR)
}

pub fn settings_path(scope: Scope, global: &Path, project: &Path) -> PathBuf {
    match scope {
        Scope::User => global.join(SETTINGS_FILE),
        Scope::Project => project.join(CLAUDE_DIR).join(SETTINGS_FILE),
    }
}

pub fn claude_md_path(scope: Scope, global: &Path, project: &Path) -> PathBuf {
    match scope {
        Scope::User => global.join(CLAUDE_MD),
        Scope::Project => project.join(CLAUDE_MD),
    }
}

pub fn permissions_declaration_path(source_dir: &Path) -> PathBuf {
    source_dir.join(PERMISSIONS_FILE)
}

// ---------------------------------------------------------------------------
// Section id validation
// ---------------------------------------------------------------------------

static SECTION_ID_RE: OnceLock<Regex> = OnceLock::new();

fn section_id_re() -> &'static Regex {
    SECTION_ID_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._\-]*$").unwrap())
}

pub fn validate_section_id(id: &str) -> Result<()> {
    if id.len() > 128 || !section_id_re().is_match(id) {
        return Err(CcfgError::InvalidSectionId(id.to_string()));
    }
    Ok(())
}

pub fn validate_version(version: &str) -> Result<()> {
    if version.is_empty() || version.chars().any(char::is_whitespace) || version.contains("-->") {
        return Err(CcfgError::InvalidVersion(version.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_section_ids() {
        for id in ["core", "a", "lang.rust", "team_rules-2", "V1"] {
            validate_section_id(id).unwrap_or_else(|_| panic!("expected valid: {id}"));
        }
    }

    #[test]
    fn invalid_section_ids() {
        for id in ["", "-dash", "has space", "a*b", "x:y", ".hidden"] {
            assert!(validate_section_id(id).is_err(), "expected invalid: {id}");
        }
    }

    #[test]
    fn invalid_versions() {
        for v in ["", "1 .0", "v1\t", "-->"] {
            assert!(validate_version(v).is_err(), "expected invalid: {v:?}");
        }
        validate_version("1.2.0").unwrap();
    }

    #[test]
    fn path_helpers() {
        let global = Path::new("/home/dev/.claude");
        let project = Path::new("/work/app");
        assert_eq!(
            settings_path(Scope::User, global, project),
            PathBuf::from("/home/dev/.claude/settings.json")
        );
        assert_eq!(
            settings_path(Scope::Project, global, project),
            PathBuf::from("/work/app/.claude/settings.json")
        );
        assert_eq!(
            claude_md_path(Scope::Project, global, project),
            PathBuf::from("/work/app/CLAUDE.md")
        );
        assert_eq!(
            default_backup_dir(global),
            PathBuf::from("/home/dev/.claude/backups")
        );
    }

    #[test]
    fn explicit_global_root_wins() {
        let root = global_root(Some(Path::new("/tmp/cfg"))).unwrap();
        assert_eq!(root, PathBuf::from("/tmp/cfg"));
    }
}
