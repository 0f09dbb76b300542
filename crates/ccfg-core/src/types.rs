use crate::error::{CcfgError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// Which instance of a same-named file an operation targets.
///
/// `User` is the default: the file under the global config root
/// (`~/.claude/settings.json`, `~/.claude/CLAUDE.md`). `Project` targets the
/// copy owned by the current project.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    #[default]
    User,
    Project,
}

impl Scope {
    pub fn as_str(self) -> &'static str {
        match self {
            Scope::User => "user",
            Scope::Project => "project",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Scope {
    type Err = CcfgError;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "user" | "global" => Ok(Scope::User),
            "project" | "local" => Ok(Scope::Project),
            other => Err(CcfgError::InvalidScope(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// UpsertOutcome
// ---------------------------------------------------------------------------

/// What `section::upsert` did to the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Added,
    Unchanged,
    Updated,
}

impl UpsertOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            UpsertOutcome::Added => "added",
            UpsertOutcome::Unchanged => "unchanged",
            UpsertOutcome::Updated => "updated",
        }
    }

    pub fn is_write(self) -> bool {
        !matches!(self, UpsertOutcome::Unchanged)
    }
}

impl fmt::Display for UpsertOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
