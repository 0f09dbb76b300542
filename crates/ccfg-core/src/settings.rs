//! Monotonic merges into a JSON settings document.
//!
//! Merges only ever add permissions, enable plugins, or fill unset flags.
//! Nothing is removed, and keys the merge does not own are written back as
//! they were read (key order included).

use crate::config::SettingsKeys;
use crate::error::{CcfgError, Result};
use crate::io;
use crate::paths;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Plugin entry validation
// ---------------------------------------------------------------------------

static PLUGIN_ENTRY_RE: OnceLock<Regex> = OnceLock::new();

fn plugin_entry_re() -> &'static Regex {
    PLUGIN_ENTRY_RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+$").unwrap())
}

pub fn validate_plugin_entry(entry: &str) -> Result<()> {
    if !plugin_entry_re().is_match(entry) {
        return Err(CcfgError::InvalidPluginEntry(entry.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// MergeReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReport {
    /// Entries that were not present (or not enabled) before the merge.
    pub added: Vec<String>,
    /// Size of the merged list or map.
    pub total: usize,
    /// Whether the file was rewritten.
    pub written: bool,
}

// ---------------------------------------------------------------------------
// SettingsDocument
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SettingsDocument {
    path: PathBuf,
    root: Map<String, Value>,
}

impl SettingsDocument {
    /// Open for merging: an absent file is first created as `{}`.
    pub fn open(path: &Path) -> Result<Self> {
        if io::write_if_missing(path, b"{}\n")? {
            tracing::debug!(path = %path.display(), "created empty settings document");
        }
        Self::load(path)
    }

    /// Read without creating. An absent file reads as `{}`.
    pub fn load(path: &Path) -> Result<Self> {
        let root = match io::read_if_exists(path)? {
            Some(text) => parse_root(path, &text)?,
            None => Map::new(),
        };
        Ok(Self {
            path: path.to_path_buf(),
            root,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.root
    }

    pub fn to_pretty(&self) -> Result<String> {
        let mut out = serde_json::to_string_pretty(&self.root)?;
        out.push('\n');
        Ok(out)
    }

    pub fn save(&self) -> Result<()> {
        io::atomic_write(&self.path, self.to_pretty()?.as_bytes())
    }

    /// Current permission grants at the configured dotted path.
    pub fn permissions(&self, keys: &SettingsKeys) -> Result<BTreeSet<String>> {
        let segments = keys.permissions_path();
        let mut node = &self.root;
        let (last, parents) = segments
            .split_last()
            .ok_or_else(|| self.shape("permissions key is empty"))?;
        for seg in parents {
            match node.get(*seg) {
                None | Some(Value::Null) => return Ok(BTreeSet::new()),
                Some(Value::Object(map)) => node = map,
                Some(_) => {
                    return Err(self.shape(&format!("'{seg}' is not an object")));
                }
            }
        }
        match node.get(*last) {
            None | Some(Value::Null) => Ok(BTreeSet::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| match v {
                    Value::String(s) => Ok(s.clone()),
                    other => Err(self.shape(&format!(
                        "'{}' contains a non-string entry: {other}",
                        keys.permissions_key
                    ))),
                })
                .collect(),
            Some(_) => Err(self.shape(&format!(
                "'{}' is not an array",
                keys.permissions_key
            ))),
        }
    }

    fn set_permissions(&mut self, keys: &SettingsKeys, perms: &BTreeSet<String>) -> Result<()> {
        let segments = keys.permissions_path();
        let (last, parents) = segments
            .split_last()
            .ok_or_else(|| self.shape("permissions key is empty"))?;
        let path = self.path.clone();
        let mut node = &mut self.root;
        for seg in parents {
            let entry = node
                .entry(seg.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if entry.is_null() {
                *entry = Value::Object(Map::new());
            }
            node = match entry {
                Value::Object(map) => map,
                _ => {
                    return Err(CcfgError::SettingsShape {
                        path,
                        reason: format!("'{seg}' is not an object"),
                    })
                }
            };
        }
        node.insert(
            last.to_string(),
            Value::Array(perms.iter().cloned().map(Value::String).collect()),
        );
        Ok(())
    }

    fn plugins_mut(&mut self, keys: &SettingsKeys) -> Result<&mut Map<String, Value>> {
        let path = self.path.clone();
        let entry = self
            .root
            .entry(keys.plugins_key.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if entry.is_null() {
            *entry = Value::Object(Map::new());
        }
        match entry {
            Value::Object(map) => Ok(map),
            _ => Err(CcfgError::SettingsShape {
                path,
                reason: format!("'{}' is not an object", keys.plugins_key),
            }),
        }
    }

    fn shape(&self, reason: &str) -> CcfgError {
        CcfgError::SettingsShape {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }
}

fn parse_root(path: &Path, text: &str) -> Result<Map<String, Value>> {
    let value: Value = serde_json::from_str(text).map_err(|source| CcfgError::SettingsParse {
        path: path.to_path_buf(),
        source,
    })?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(CcfgError::SettingsShape {
            path: path.to_path_buf(),
            reason: format!("top level must be an object, found {}", type_name(&other)),
        }),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// Permission declarations
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PermissionDeclaration {
    List(Vec<String>),
    Object { permissions: Vec<String> },
}

/// Read `<source_dir>/permissions.json`. A missing file declares nothing.
pub fn read_declared_permissions(source_dir: &Path) -> Result<BTreeSet<String>> {
    let path = paths::permissions_declaration_path(source_dir);
    let Some(text) = io::read_if_exists(&path)? else {
        return Ok(BTreeSet::new());
    };
    let decl: PermissionDeclaration =
        serde_json::from_str(&text).map_err(|source| CcfgError::PermissionsDeclaration {
            path: path.clone(),
            source,
        })?;
    let list = match decl {
        PermissionDeclaration::List(list) => list,
        PermissionDeclaration::Object { permissions } => permissions,
    };
    Ok(list
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect())
}

// ---------------------------------------------------------------------------
// Merges
// ---------------------------------------------------------------------------

/// Union `new` into the permission list. The result is sorted and
/// deduplicated.
pub fn merge_permissions<I, S>(doc: &Path, keys: &SettingsKeys, new: I) -> Result<MergeReport>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut settings = SettingsDocument::open(doc)?;
    let existing = settings.permissions(keys)?;
    let mut merged = existing.clone();
    let mut added = Vec::new();
    for p in new {
        let p = p.into();
        if !existing.contains(&p) && merged.insert(p.clone()) {
            added.push(p);
        }
    }
    added.sort();

    let before = settings.root.clone();
    settings.set_permissions(keys, &merged)?;
    let written = settings.root != before;
    if written {
        settings.save()?;
    }
    Ok(MergeReport {
        added,
        total: merged.len(),
        written,
    })
}

/// Enable each `plugin@marketplace` entry. Other entries are left alone.
pub fn merge_plugins<I, S>(doc: &Path, keys: &SettingsKeys, entries: I) -> Result<MergeReport>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let entries: Vec<String> = entries.into_iter().map(Into::into).collect();
    for entry in &entries {
        validate_plugin_entry(entry)?;
    }

    let mut settings = SettingsDocument::open(doc)?;
    let before = settings.root.clone();
    let plugins = settings.plugins_mut(keys)?;
    let mut added = Vec::new();
    for entry in entries {
        if plugins.get(&entry) != Some(&Value::Bool(true)) {
            plugins.insert(entry.clone(), Value::Bool(true));
            added.push(entry);
        }
    }
    let total = plugins.len();
    added.sort();
    added.dedup();

    let written = settings.root != before;
    if written {
        settings.save()?;
    }
    Ok(MergeReport {
        added,
        total,
        written,
    })
}

/// Set a top-level flag only if it is absent or `null`. Returns true if it
/// was written.
pub fn set_default_flag(doc: &Path, key: &str, value: bool) -> Result<bool> {
    let mut settings = SettingsDocument::open(doc)?;
    match settings.root.get(key) {
        None | Some(Value::Null) => {
            settings.root.insert(key.to_string(), Value::Bool(value));
            settings.save()?;
            Ok(true)
        }
        Some(_) => Ok(false),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn read_json(path: &Path) -> Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn merge_plugins_bootstraps_empty_file() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("settings.json");
        std::fs::write(&doc, "{}").unwrap();

        let report = merge_plugins(&doc, &SettingsKeys::default(), ["core@market"]).unwrap();
        assert_eq!(report.added, vec!["core@market".to_string()]);
        assert_eq!(
            read_json(&doc),
            json!({"enabledPlugins": {"core@market": true}})
        );
    }

    #[test]
    fn merge_creates_missing_document() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join(".claude/settings.json");
        merge_permissions(&doc, &SettingsKeys::default(), ["Bash(git:*)"]).unwrap();
        assert_eq!(
            read_json(&doc),
            json!({"permissions": {"allow": ["Bash(git:*)"]}})
        );
    }

    #[test]
    fn permissions_union_is_order_independent() {
        let keys = SettingsKeys::default();
        let dir = TempDir::new().unwrap();

        let first = dir.path().join("one.json");
        merge_permissions(&first, &keys, ["a", "b"]).unwrap();
        merge_permissions(&first, &keys, ["b", "c"]).unwrap();

        let second = dir.path().join("two.json");
        merge_permissions(&second, &keys, ["b", "c"]).unwrap();
        merge_permissions(&second, &keys, ["a", "b"]).unwrap();

        let expected = json!({"permissions": {"allow": ["a", "b", "c"]}});
        assert_eq!(read_json(&first), expected);
        assert_eq!(read_json(&second), expected);
    }

    #[test]
    fn permissions_merge_is_idempotent() {
        let keys = SettingsKeys::default();
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("settings.json");
        merge_permissions(&doc, &keys, ["Read", "Edit"]).unwrap();
        let before = std::fs::read_to_string(&doc).unwrap();

        let report = merge_permissions(&doc, &keys, ["Edit", "Read"]).unwrap();
        assert!(report.added.is_empty());
        assert!(!report.written);
        assert_eq!(report.total, 2);
        assert_eq!(std::fs::read_to_string(&doc).unwrap(), before);
    }

    #[test]
    fn merge_preserves_unrelated_keys_and_order() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("settings.json");
        std::fs::write(
            &doc,
            r#"{"zeta": 1, "permissions": {"deny": ["WebFetch"], "allow": ["Read"]}, "alpha": {"x": [1, 2]}}"#,
        )
        .unwrap();

        merge_permissions(&doc, &SettingsKeys::default(), ["Edit"]).unwrap();
        let text = std::fs::read_to_string(&doc).unwrap();
        assert_eq!(
            serde_json::from_str::<Value>(&text).unwrap(),
            json!({"zeta": 1, "permissions": {"deny": ["WebFetch"], "allow": ["Edit", "Read"]}, "alpha": {"x": [1, 2]}})
        );
        assert!(text.find("zeta").unwrap() < text.find("alpha").unwrap());
        assert!(text.ends_with("}\n"));
    }

    #[test]
    fn merge_plugins_keeps_existing_entries() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("settings.json");
        std::fs::write(
            &doc,
            r#"{"enabledPlugins": {"old@market": true, "off@market": false}}"#,
        )
        .unwrap();

        let report = merge_plugins(
            &doc,
            &SettingsKeys::default(),
            ["new@market", "old@market", "off@market"],
        )
        .unwrap();
        assert_eq!(report.added, vec!["new@market", "off@market"]);
        assert_eq!(report.total, 3);
        assert_eq!(
            read_json(&doc),
            json!({"enabledPlugins": {"old@market": true, "off@market": true, "new@market": true}})
        );
    }

    #[test]
    fn merge_plugins_rejects_bad_entry_without_writing() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("settings.json");
        let err = merge_plugins(&doc, &SettingsKeys::default(), ["no-marketplace"]).unwrap_err();
        assert!(matches!(err, CcfgError::InvalidPluginEntry(_)));
        assert!(!doc.exists());
    }

    #[test]
    fn malformed_json_aborts_without_writing() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("settings.json");
        std::fs::write(&doc, "{ \"permissions\": [").unwrap();

        let err = merge_permissions(&doc, &SettingsKeys::default(), ["Read"]).unwrap_err();
        assert!(matches!(err, CcfgError::SettingsParse { .. }));
        let err = merge_plugins(&doc, &SettingsKeys::default(), ["a@b"]).unwrap_err();
        assert!(matches!(err, CcfgError::SettingsParse { .. }));
        let err = set_default_flag(&doc, "flag", true).unwrap_err();
        assert!(matches!(err, CcfgError::SettingsParse { .. }));
        assert_eq!(std::fs::read_to_string(&doc).unwrap(), "{ \"permissions\": [");
    }

    #[test]
    fn wrong_shapes_are_rejected() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("settings.json");

        std::fs::write(&doc, "[1, 2]").unwrap();
        let err = merge_plugins(&doc, &SettingsKeys::default(), ["a@b"]).unwrap_err();
        assert!(matches!(err, CcfgError::SettingsShape { .. }));

        std::fs::write(&doc, r#"{"permissions": {"allow": "Read"}}"#).unwrap();
        let err = merge_permissions(&doc, &SettingsKeys::default(), ["Edit"]).unwrap_err();
        assert!(matches!(err, CcfgError::SettingsShape { .. }));

        std::fs::write(&doc, r#"{"enabledPlugins": ["a@b"]}"#).unwrap();
        let err = merge_plugins(&doc, &SettingsKeys::default(), ["c@d"]).unwrap_err();
        assert!(matches!(err, CcfgError::SettingsShape { .. }));
        assert_eq!(
            std::fs::read_to_string(&doc).unwrap(),
            r#"{"enabledPlugins": ["a@b"]}"#
        );
    }

    #[test]
    fn custom_keys_are_honoured() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("settings.json");
        let keys = SettingsKeys {
            permissions_key: "allowedTools".to_string(),
            plugins_key: "plugins".to_string(),
        };
        merge_permissions(&doc, &keys, ["Read"]).unwrap();
        merge_plugins(&doc, &keys, ["x@y"]).unwrap();
        assert_eq!(
            read_json(&doc),
            json!({"allowedTools": ["Read"], "plugins": {"x@y": true}})
        );
    }

    #[test]
    fn set_default_flag_only_when_unset() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("settings.json");
        std::fs::write(&doc, r#"{"a": null, "b": false}"#).unwrap();

        assert!(set_default_flag(&doc, "a", true).unwrap());
        assert!(!set_default_flag(&doc, "b", true).unwrap());
        assert!(set_default_flag(&doc, "c", false).unwrap());
        assert!(!set_default_flag(&doc, "c", true).unwrap());
        assert_eq!(read_json(&doc), json!({"a": true, "b": false, "c": false}));
    }

    #[test]
    fn declared_permissions_both_forms() {
        let dir = TempDir::new().unwrap();
        assert!(read_declared_permissions(dir.path()).unwrap().is_empty());

        std::fs::write(dir.path().join("permissions.json"), r#"["Read", "Read", " Edit "]"#)
            .unwrap();
        let perms = read_declared_permissions(dir.path()).unwrap();
        assert_eq!(perms.into_iter().collect::<Vec<_>>(), vec!["Edit", "Read"]);

        std::fs::write(
            dir.path().join("permissions.json"),
            r#"{"permissions": ["Bash(cargo:*)"]}"#,
        )
        .unwrap();
        let perms = read_declared_permissions(dir.path()).unwrap();
        assert!(perms.contains("Bash(cargo:*)"));

        std::fs::write(dir.path().join("permissions.json"), r#"{"allow": 3}"#).unwrap();
        assert!(matches!(
            read_declared_permissions(dir.path()).unwrap_err(),
            CcfgError::PermissionsDeclaration { .. }
        ));
    }

    #[test]
    fn load_does_not_create() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("settings.json");
        let settings = SettingsDocument::load(&doc).unwrap();
        assert!(settings.as_map().is_empty());
        assert!(!doc.exists());
    }
}
