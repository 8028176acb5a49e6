//! Persisted per-topology layouts
//!
//! JSON object keyed by topology fingerprint:
//!
//! ```json
//! {
//!   "DP-1,eDP-1": {
//!     "primary": "eDP-1",
//!     "monitors": [{ "name": "DP-1", "enabled": true, "x": 1920, "y": 0, "width": 2560, "height": 1440 }]
//!   }
//! }
//! ```
//!
//! Unknown fields are ignored so newer files still load.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{DisplayError, Result};
use crate::monitor::MonitorBaseInfo;

/// Saved layout for one topology
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub primary: String,
    #[serde(rename = "monitors", default)]
    pub base_infos: Vec<MonitorBaseInfo>,
}

impl ConfigEntry {
    /// Primary must name one of the stored monitors
    pub fn is_valid(&self) -> bool {
        self.base_infos.iter().any(|info| info.name == self.primary)
    }
}

/// Fingerprint → ConfigEntry, backed by a JSON file
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    entries: BTreeMap<String, ConfigEntry>,
}

impl ConfigStore {
    /// Empty store that will write to `path`
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Load from disk. A missing file yields an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "No display config found, starting empty");
                return Ok(Self::empty(path));
            }
            Err(e) => return Err(DisplayError::persistence(path, e)),
        };

        let mut entries: BTreeMap<String, ConfigEntry> = serde_json::from_str(&contents)
            .map_err(|source| DisplayError::MalformedConfig {
                path: path.clone(),
                source,
            })?;
        entries.retain(|fingerprint, entry| {
            let valid = entry.is_valid();
            if !valid {
                warn!(fingerprint = %fingerprint, primary = %entry.primary, "Dropping stored layout with unknown primary");
            }
            valid
        });

        info!(path = %path.display(), entries = entries.len(), "Loaded display config");
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, fingerprint: &str) -> Option<&ConfigEntry> {
        self.entries.get(fingerprint)
    }

    /// Upsert; at most one entry per fingerprint
    ///
    /// Entries whose primary is not among their monitors are refused.
    pub fn set(&mut self, fingerprint: &str, entry: ConfigEntry) -> Result<()> {
        if !entry.is_valid() {
            return Err(DisplayError::InvalidEntry {
                fingerprint: fingerprint.to_string(),
                primary: entry.primary,
            });
        }
        debug!(fingerprint = %fingerprint, primary = %entry.primary, "Storing layout");
        self.entries.insert(fingerprint.to_string(), entry);
        Ok(())
    }

    /// Returns whether an entry existed
    pub fn delete(&mut self, fingerprint: &str) -> bool {
        self.entries.remove(fingerprint).is_some()
    }

    /// Serialize the whole mapping and atomically replace the backing file
    pub fn write_file(&self) -> Result<()> {
        super::write_atomic(&self.path, &self.entries)
    }

    /// Remove the backing file and forget every entry
    pub fn remove_file(&mut self) -> Result<()> {
        self.entries.clear();
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "Removed display config");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DisplayError::persistence(&self.path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(name: &str, x: i16, width: u16, height: u16) -> MonitorBaseInfo {
        MonitorBaseInfo {
            name: name.to_string(),
            enabled: true,
            x,
            y: 0,
            width,
            height,
        }
    }

    fn entry(primary: &str) -> ConfigEntry {
        ConfigEntry {
            primary: primary.to_string(),
            base_infos: vec![info("A", 0, 1920, 1080), info("B", 1920, 1280, 1024)],
        }
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::load(dir.path().join("display.json")).unwrap();
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_load_malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("display.json");
        fs::write(&path, "{ not json").unwrap();
        let err = ConfigStore::load(&path).unwrap_err();
        assert!(matches!(err, DisplayError::MalformedConfig { .. }));
    }

    #[test]
    fn test_set_overwrites_same_fingerprint() {
        let mut store = ConfigStore::empty("unused.json");
        store.set("A,B", entry("A")).unwrap();
        store.set("A,B", entry("B")).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("A,B").unwrap().primary, "B");
    }

    #[test]
    fn test_delete_reports_existence() {
        let mut store = ConfigStore::empty("unused.json");
        store.set("A,B", entry("A")).unwrap();
        assert!(store.delete("A,B"));
        assert!(!store.delete("A,B"));
        assert!(store.get("A,B").is_none());
    }

    #[test]
    fn test_write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("display.json");
        let mut store = ConfigStore::empty(&path);
        store.set("A,B", entry("A")).unwrap();
        store.write_file().unwrap();

        let loaded = ConfigStore::load(&path).unwrap();
        assert_eq!(loaded.get("A,B"), Some(&entry("A")));
    }

    #[test]
    fn test_file_layout_uses_primary_and_monitors_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("display.json");
        let mut store = ConfigStore::empty(&path);
        store.set("A,B", entry("A")).unwrap();
        store.write_file().unwrap();

        let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["A,B"]["primary"], "A");
        assert_eq!(raw["A,B"]["monitors"][1]["width"], 1280);
    }

    #[test]
    fn test_load_tolerates_unknown_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("display.json");
        fs::write(
            &path,
            r#"{
                "A": {
                    "primary": "A",
                    "brightness": 0.8,
                    "monitors": [
                        { "name": "A", "enabled": true, "x": 0, "y": 0, "width": 800, "height": 600, "rotation": 1 }
                    ]
                }
            }"#,
        )
        .unwrap();
        let store = ConfigStore::load(&path).unwrap();
        let loaded = store.get("A").unwrap();
        assert!(loaded.is_valid());
        assert_eq!(loaded.base_infos[0].width, 800);
    }

    #[test]
    fn test_remove_file_clears_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("display.json");
        let mut store = ConfigStore::empty(&path);
        store.set("A,B", entry("A")).unwrap();
        store.write_file().unwrap();

        store.remove_file().unwrap();
        assert_eq!(store.len(), 0);
        assert!(!path.exists());
        // Second removal is a no-op
        store.remove_file().unwrap();
    }

    #[test]
    fn test_load_drops_entries_with_unknown_primary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("display.json");
        let mut entries = BTreeMap::new();
        entries.insert("A,B", entry("A"));
        entries.insert("A,B,C", entry("C"));
        fs::write(&path, serde_json::to_string(&entries).unwrap()).unwrap();

        let loaded = ConfigStore::load(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.get("A,B,C").is_none());
    }

    #[test]
    fn test_set_refuses_unknown_primary() {
        let mut store = ConfigStore::empty("unused.json");
        let err = store.set("A,B", entry("")).unwrap_err();
        assert!(matches!(err, DisplayError::InvalidEntry { primary, .. } if primary.is_empty()));
        assert!(store.get("A,B").is_none());
    }

    #[test]
    fn test_entry_validity() {
        assert!(entry("A").is_valid());
        assert!(!entry("C").is_valid());
    }
}
