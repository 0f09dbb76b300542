//! Timestamped snapshots of the files ccfg mutates.
//!
//! Layout:
//!   <backup_dir>/
//!     settings_20250101_120000.json          — ~/.claude/settings.json
//!     project_settings_20250101_120005.json  — <project>/.claude/settings.json
//!     CLAUDE_20250101_120010.md              — ~/.claude/CLAUDE.md
//!
//! File names sort chronologically, so listing is a name sort.

use crate::error::{CcfgError, Result};
use crate::io;
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
pub const DEFAULT_RETAIN: usize = 10;

const PROJECT_PREFIX: &str = "project_";
const FALLBACK_EXT: &str = "bak";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The namespace under which all snapshots of one logical file are grouped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupIdentity {
    pub name: String,
    pub ext: String,
}

impl BackupIdentity {
    fn file_name(&self, timestamp: &str) -> String {
        format!("{}_{}.{}", self.name, timestamp, self.ext)
    }

    /// The timestamp embedded in `file_name`, if it belongs to this identity.
    fn timestamp_of<'a>(&self, file_name: &'a str) -> Option<&'a str> {
        let ts = file_name
            .strip_prefix(self.name.as_str())?
            .strip_prefix('_')?
            .strip_suffix(self.ext.as_str())?
            .strip_suffix('.')?;
        validate_timestamp(ts).ok()?;
        Some(ts)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupEntry {
    pub path: PathBuf,
    pub size: u64,
    pub timestamp: String,
}

pub fn validate_timestamp(ts: &str) -> Result<()> {
    if ts.len() != 15 || NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT).is_err() {
        return Err(CcfgError::InvalidTimestamp(ts.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// BackupManager
// ---------------------------------------------------------------------------

pub struct BackupManager {
    dir: PathBuf,
    global_root: PathBuf,
    retain: usize,
    clock: Box<dyn Fn() -> NaiveDateTime>,
}

impl std::fmt::Debug for BackupManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupManager")
            .field("dir", &self.dir)
            .field("global_root", &self.global_root)
            .field("retain", &self.retain)
            .finish_non_exhaustive()
    }
}

impl BackupManager {
    pub fn new(dir: impl Into<PathBuf>, global_root: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            global_root: global_root.into(),
            retain: DEFAULT_RETAIN,
            clock: Box::new(|| Local::now().naive_local()),
        }
    }

    pub fn with_retain(mut self, retain: usize) -> Self {
        self.retain = retain;
        self
    }

    /// Replace the time source used to stamp new snapshots.
    pub fn with_clock(mut self, clock: impl Fn() -> NaiveDateTime + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn retain(&self) -> usize {
        self.retain
    }

    /// Derive the backup identity of `source`. Files directly under the
    /// global root keep their stem; any other location gets a `project_`
    /// prefix so same-named files never share a namespace.
    pub fn identity(&self, source: &Path) -> Result<BackupIdentity> {
        let file_name = source
            .file_name()
            .ok_or_else(|| CcfgError::InvalidBackupSource(source.to_path_buf()))?;
        let as_path = Path::new(file_name);
        let stem = as_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| CcfgError::InvalidBackupSource(source.to_path_buf()))?;
        let ext = as_path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_else(|| FALLBACK_EXT.to_string());

        let is_global = source
            .parent()
            .map(|parent| {
                let parent = if parent.as_os_str().is_empty() {
                    Path::new(".")
                } else {
                    parent
                };
                same_dir(parent, &self.global_root)
            })
            .unwrap_or(false);
        let name = if is_global {
            stem
        } else {
            format!("{PROJECT_PREFIX}{stem}")
        };
        Ok(BackupIdentity { name, ext })
    }

    /// Snapshot `source`. A missing source has nothing to protect and
    /// yields `None`. A second snapshot within the same second replaces the
    /// first.
    pub fn create(&self, source: &Path) -> Result<Option<PathBuf>> {
        if !source.is_file() {
            return Ok(None);
        }
        let identity = self.identity(source)?;
        io::ensure_dir(&self.dir)?;
        let timestamp = (self.clock)().format(TIMESTAMP_FORMAT).to_string();
        let dest = self.dir.join(identity.file_name(&timestamp));
        std::fs::copy(source, &dest)?;
        tracing::debug!(source = %source.display(), backup = %dest.display(), "created backup");
        Ok(Some(dest))
    }

    /// Snapshot, then prune down to the configured retention. The snapshot
    /// just taken always survives, whatever the retention.
    pub fn protect(&self, source: &Path) -> Result<Option<PathBuf>> {
        let created = self.create(source)?;
        if created.is_some() {
            self.prune(source, self.retain.max(1))?;
        }
        Ok(created)
    }

    /// All snapshots of `source`, newest first.
    pub fn list(&self, source: &Path) -> Result<Vec<BackupEntry>> {
        let identity = self.identity(source)?;
        let read_dir = match std::fs::read_dir(&self.dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for entry in read_dir {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let Some(ts) = identity.timestamp_of(name) else {
                continue;
            };
            let meta = entry.metadata()?;
            if !meta.is_file() {
                continue;
            }
            entries.push(BackupEntry {
                path: entry.path(),
                size: meta.len(),
                timestamp: ts.to_string(),
            });
        }
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(entries)
    }

    /// Copy a snapshot back over `source`: the one at `timestamp`, else the
    /// newest. The current state is snapshotted first so the restore can be
    /// undone.
    pub fn restore(&self, source: &Path, timestamp: Option<&str>) -> Result<PathBuf> {
        let entries = self.list(source)?;
        if entries.is_empty() {
            return Err(CcfgError::NoBackups(source.to_path_buf()));
        }
        let selected = match timestamp {
            Some(ts) => {
                validate_timestamp(ts)?;
                entries
                    .into_iter()
                    .find(|e| e.timestamp == ts)
                    .ok_or_else(|| CcfgError::BackupNotFound {
                        path: source.to_path_buf(),
                        timestamp: ts.to_string(),
                    })?
            }
            None => entries.into_iter().next().ok_or_else(|| {
                CcfgError::NoBackups(source.to_path_buf())
            })?,
        };

        // Read before snapshotting: a same-second safety snapshot would
        // otherwise overwrite the file we are about to restore.
        let data = std::fs::read(&selected.path)?;
        self.create(source)?;
        io::atomic_write(source, &data)?;
        tracing::info!(source = %source.display(), from = %selected.path.display(), "restored backup");
        Ok(selected.path)
    }

    /// Snapshot the current state, then restore the snapshot taken just
    /// before it.
    pub fn rollback(&self, source: &Path) -> Result<PathBuf> {
        let safety = self.create(source)?;
        let entries = self.list(source)?;
        let target = match &safety {
            Some(path) => entries
                .iter()
                .position(|e| &e.path == path)
                .and_then(|i| entries.get(i + 1)),
            None => entries.first(),
        };
        let Some(target) = target else {
            return Err(if entries.is_empty() {
                CcfgError::NoBackups(source.to_path_buf())
            } else {
                CcfgError::NothingToRollback(source.to_path_buf())
            });
        };

        let data = std::fs::read(&target.path)?;
        io::atomic_write(source, &data)?;
        tracing::info!(source = %source.display(), from = %target.path.display(), "rolled back");
        Ok(target.path.clone())
    }

    /// Delete all but the `keep` newest snapshots. Individual delete
    /// failures are logged and skipped. Returns how many were removed.
    pub fn prune(&self, source: &Path, keep: usize) -> Result<usize> {
        let entries = self.list(source)?;
        let mut removed = 0;
        for entry in entries.iter().skip(keep) {
            match std::fs::remove_file(&entry.path) {
                Ok(()) => removed += 1,
                Err(e) => {
                    tracing::warn!(backup = %entry.path.display(), error = %e, "failed to prune backup");
                }
            }
        }
        Ok(removed)
    }
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use std::cell::Cell;
    use std::rc::Rc;
    use tempfile::TempDir;

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 14)
            .unwrap()
            .and_hms_opt(9, 26, 53)
            .unwrap()
    }

    /// A clock that advances one second per call.
    fn stepping_clock() -> impl Fn() -> NaiveDateTime {
        let ticks = Rc::new(Cell::new(0i64));
        move || {
            let n = ticks.get();
            ticks.set(n + 1);
            t0() + Duration::seconds(n)
        }
    }

    struct Fixture {
        _dir: TempDir,
        global: PathBuf,
        project: PathBuf,
        backups: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let global = dir.path().join("home/.claude");
        let project = dir.path().join("work/app/.claude");
        std::fs::create_dir_all(&global).unwrap();
        std::fs::create_dir_all(&project).unwrap();
        let backups = global.join("backups");
        Fixture {
            global,
            project,
            backups,
            _dir: dir,
        }
    }

    fn manager(fx: &Fixture) -> BackupManager {
        BackupManager::new(&fx.backups, &fx.global).with_clock(stepping_clock())
    }

    #[test]
    fn identity_disambiguates_roles() {
        let fx = fixture();
        let mgr = manager(&fx);
        let user = mgr.identity(&fx.global.join("settings.json")).unwrap();
        let project = mgr.identity(&fx.project.join("settings.json")).unwrap();
        assert_eq!(user.name, "settings");
        assert_eq!(project.name, "project_settings");
        assert_eq!(user.ext, "json");

        let bare = mgr.identity(&fx.global.join("Makefile")).unwrap();
        assert_eq!(bare.ext, "bak");
    }

    #[test]
    fn identity_of_bare_file_name_resolves_against_cwd() {
        let cwd = std::env::current_dir().unwrap();
        let mgr = BackupManager::new(cwd.join("backups"), &cwd);
        let bare = mgr.identity(Path::new("settings.json")).unwrap();
        let dotted = mgr.identity(Path::new("./settings.json")).unwrap();
        let absolute = mgr.identity(&cwd.join("settings.json")).unwrap();
        assert_eq!(bare.name, "settings");
        assert_eq!(bare, dotted);
        assert_eq!(bare, absolute);
    }

    #[test]
    fn create_missing_source_is_noop() {
        let fx = fixture();
        let mgr = manager(&fx);
        assert_eq!(mgr.create(&fx.global.join("settings.json")).unwrap(), None);
        assert!(!fx.backups.exists());
    }

    #[test]
    fn create_names_and_copies() {
        let fx = fixture();
        let mgr = manager(&fx);
        let src = fx.global.join("settings.json");
        std::fs::write(&src, "{\"a\":1}").unwrap();

        let path = mgr.create(&src).unwrap().unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "settings_20250314_092653.json"
        );
        assert_eq!(std::fs::read(&path).unwrap(), b"{\"a\":1}");
    }

    #[test]
    fn list_is_newest_first_and_scoped_to_identity() {
        let fx = fixture();
        let mgr = manager(&fx);
        let user = fx.global.join("settings.json");
        let project = fx.project.join("settings.json");
        let local = fx.global.join("settings_local.json");
        std::fs::write(&user, "u").unwrap();
        std::fs::write(&project, "p").unwrap();
        std::fs::write(&local, "l").unwrap();

        for _ in 0..4 {
            mgr.create(&user).unwrap();
        }
        mgr.create(&project).unwrap();
        mgr.create(&local).unwrap();
        std::fs::write(fx.backups.join("settings_notatime.json"), "junk").unwrap();

        let listed = mgr.list(&user).unwrap();
        assert_eq!(listed.len(), 4);
        for pair in listed.windows(2) {
            assert!(pair[0].timestamp > pair[1].timestamp);
        }
        assert_eq!(listed[0].size, 1);
        assert_eq!(mgr.list(&project).unwrap().len(), 1);
        assert_eq!(mgr.list(&local).unwrap().len(), 1);
    }

    #[test]
    fn same_second_create_overwrites() {
        let fx = fixture();
        let mgr = BackupManager::new(&fx.backups, &fx.global).with_clock(t0);
        let src = fx.global.join("CLAUDE.md");
        std::fs::write(&src, "one").unwrap();
        mgr.create(&src).unwrap();
        std::fs::write(&src, "two").unwrap();
        mgr.create(&src).unwrap();

        let listed = mgr.list(&src).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(std::fs::read_to_string(&listed[0].path).unwrap(), "two");
    }

    #[test]
    fn restore_newest_takes_safety_snapshot() {
        let fx = fixture();
        let mgr = manager(&fx);
        let src = fx.global.join("settings.json");
        std::fs::write(&src, "v1").unwrap();
        mgr.create(&src).unwrap();
        std::fs::write(&src, "v2").unwrap();

        mgr.restore(&src, None).unwrap();
        assert_eq!(std::fs::read_to_string(&src).unwrap(), "v1");

        let listed = mgr.list(&src).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(std::fs::read_to_string(&listed[0].path).unwrap(), "v2");
    }

    #[test]
    fn restore_by_timestamp() {
        let fx = fixture();
        let mgr = manager(&fx);
        let src = fx.global.join("settings.json");
        for v in ["a", "b", "c"] {
            std::fs::write(&src, v).unwrap();
            mgr.create(&src).unwrap();
        }
        mgr.restore(&src, Some("20250314_092653")).unwrap();
        assert_eq!(std::fs::read_to_string(&src).unwrap(), "a");

        let err = mgr.restore(&src, Some("20990101_000000")).unwrap_err();
        assert!(matches!(err, CcfgError::BackupNotFound { .. }));
        let err = mgr.restore(&src, Some("yesterday")).unwrap_err();
        assert!(matches!(err, CcfgError::InvalidTimestamp(_)));
    }

    #[test]
    fn restore_without_backups_fails() {
        let fx = fixture();
        let mgr = manager(&fx);
        let src = fx.global.join("settings.json");
        std::fs::write(&src, "live").unwrap();
        let err = mgr.restore(&src, None).unwrap_err();
        assert!(matches!(err, CcfgError::NoBackups(_)));
        assert_eq!(std::fs::read_to_string(&src).unwrap(), "live");
    }

    #[test]
    fn restore_survives_same_second_collision() {
        let fx = fixture();
        let mgr = BackupManager::new(&fx.backups, &fx.global).with_clock(t0);
        let src = fx.global.join("settings.json");
        std::fs::write(&src, "saved").unwrap();
        mgr.create(&src).unwrap();
        std::fs::write(&src, "broken").unwrap();

        mgr.restore(&src, None).unwrap();
        assert_eq!(std::fs::read_to_string(&src).unwrap(), "saved");
    }

    #[test]
    fn rollback_with_one_backup_fails_and_leaves_file() {
        let fx = fixture();
        let mgr = BackupManager::new(&fx.backups, &fx.global).with_clock(t0);
        let src = fx.global.join("settings.json");
        std::fs::write(&src, "current").unwrap();
        mgr.create(&src).unwrap();

        let err = mgr.rollback(&src).unwrap_err();
        assert!(matches!(err, CcfgError::NothingToRollback(_)));
        assert!(err.to_string().contains("nothing to rollback to"));
        assert_eq!(std::fs::read_to_string(&src).unwrap(), "current");
    }

    #[test]
    fn rollback_is_itself_reversible() {
        let fx = fixture();
        let mgr = manager(&fx);
        let src = fx.global.join("CLAUDE.md");
        std::fs::write(&src, "A").unwrap();
        mgr.create(&src).unwrap();
        std::fs::write(&src, "B").unwrap();

        mgr.rollback(&src).unwrap();
        assert_eq!(std::fs::read_to_string(&src).unwrap(), "A");

        mgr.rollback(&src).unwrap();
        assert_eq!(std::fs::read_to_string(&src).unwrap(), "B");
        assert_eq!(mgr.list(&src).unwrap().len(), 3);
    }

    #[test]
    fn rollback_without_any_backup() {
        let fx = fixture();
        let mgr = manager(&fx);
        let src = fx.global.join("settings.json");
        let err = mgr.rollback(&src).unwrap_err();
        assert!(matches!(err, CcfgError::NoBackups(_)));
    }

    #[test]
    fn prune_keeps_newest() {
        let fx = fixture();
        let mgr = manager(&fx);
        let src = fx.project.join("settings.json");
        std::fs::write(&src, "x").unwrap();
        for _ in 0..7 {
            mgr.create(&src).unwrap();
        }
        let before = mgr.list(&src).unwrap();

        assert_eq!(mgr.prune(&src, 3).unwrap(), 4);
        let after = mgr.list(&src).unwrap();
        assert_eq!(after, before[..3].to_vec());

        assert_eq!(mgr.prune(&src, 10).unwrap(), 0);
        assert_eq!(mgr.list(&src).unwrap().len(), 3);
    }

    #[test]
    fn prune_empty_is_ok() {
        let fx = fixture();
        let mgr = manager(&fx);
        assert_eq!(mgr.prune(&fx.global.join("settings.json"), 0).unwrap(), 0);
    }

    #[test]
    fn protect_applies_retention() {
        let fx = fixture();
        let mgr = manager(&fx).with_retain(2);
        let src = fx.global.join("settings.json");
        std::fs::write(&src, "x").unwrap();
        for _ in 0..5 {
            mgr.protect(&src).unwrap();
        }
        assert_eq!(mgr.list(&src).unwrap().len(), 2);
    }

    #[test]
    fn protect_with_zero_retain_keeps_new_snapshot() {
        let fx = fixture();
        let mgr = manager(&fx).with_retain(0);
        let src = fx.global.join("settings.json");
        std::fs::write(&src, "x").unwrap();
        for _ in 0..3 {
            let path = mgr.protect(&src).unwrap().unwrap();
            assert!(path.exists());
        }
        assert_eq!(mgr.list(&src).unwrap().len(), 1);
    }

    #[test]
    fn list_ignores_short_timestamps() {
        let fx = fixture();
        let mgr = manager(&fx);
        let src = fx.global.join("settings.json");
        std::fs::create_dir_all(&fx.backups).unwrap();
        std::fs::write(fx.backups.join("settings_2025314_92653.json"), "short").unwrap();
        std::fs::write(fx.backups.join("settings_20250314_092653.json"), "full").unwrap();

        let listed = mgr.list(&src).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].timestamp, "20250314_092653");
    }
}
