use anyhow::Context;
use ccfg_core::{backup::BackupManager, config::Config, paths, types::Scope};
use std::path::{Path, PathBuf};

/// Resolve the project root.
///
/// Priority:
/// 1. `--project` flag / `CCFG_PROJECT` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `.claude/`
/// 3. Walk upward from `cwd` looking for `.git/`
/// 4. Fall back to `cwd`
pub fn resolve_project_root(explicit: Option<&Path>, global: &Path) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    for marker in [paths::CLAUDE_DIR, ".git"] {
        let mut dir = cwd.clone();
        loop {
            // The home directory's .claude is the global root, not a project.
            if dir.join(marker).is_dir() && dir.join(marker) != global {
                return dir;
            }
            match dir.parent() {
                Some(p) => dir = p.to_path_buf(),
                None => break,
            }
        }
    }

    cwd
}

/// Roots and configuration shared by every subcommand.
pub struct Workspace {
    pub global: PathBuf,
    pub project: PathBuf,
    pub config: Config,
}

impl Workspace {
    pub fn load(home: Option<&Path>, project: Option<&Path>) -> anyhow::Result<Self> {
        let global = paths::global_root(home).context("failed to resolve global config root")?;
        let project = resolve_project_root(project, &global);
        let config = Config::load(&global)
            .with_context(|| format!("failed to load {}", paths::config_path(&global).display()))?;
        tracing::debug!(global = %global.display(), project = %project.display(), "resolved roots");
        Ok(Self {
            global,
            project,
            config,
        })
    }

    pub fn backups(&self) -> BackupManager {
        BackupManager::new(self.config.backup_dir(&self.global), &self.global)
            .with_retain(self.config.backup.retain)
    }

    pub fn settings_path(&self, scope: Scope, file: Option<&Path>) -> PathBuf {
        file.map(Path::to_path_buf)
            .unwrap_or_else(|| paths::settings_path(scope, &self.global, &self.project))
    }

    pub fn claude_md_path(&self, scope: Scope, file: Option<&Path>) -> PathBuf {
        file.map(Path::to_path_buf)
            .unwrap_or_else(|| paths::claude_md_path(scope, &self.global, &self.project))
    }

    /// Snapshot `target`, then run `op`. If `op` fails after a snapshot was
    /// taken, the error says how to get the original back.
    pub fn with_backup<T>(
        &self,
        target: &Path,
        op: impl FnOnce() -> anyhow::Result<T>,
    ) -> anyhow::Result<T> {
        let snapshot = self
            .backups()
            .protect(target)
            .with_context(|| format!("failed to back up {}", target.display()))?;
        if let Some(path) = &snapshot {
            tracing::debug!(backup = %path.display(), "snapshot before mutation");
        }
        op().map_err(|e| match snapshot {
            Some(_) => e.context(format!(
                "original files are preserved; run `ccfg backup rollback {}` to undo",
                target.display()
            )),
            None => e,
        })
    }
}
