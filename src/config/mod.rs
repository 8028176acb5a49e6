//! Configuration management for monitor-configd
//!
//! This module provides two persisted config files:
//! - **store**: ConfigStore mapping topology fingerprints to saved layouts (display.json)
//! - **system**: SystemConfig holding desktop-wide scale factors (system.json)
//!
//! Both are written with [`write_atomic`] so a crash never leaves a torn file.

pub mod store;
pub mod system;

use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{DisplayError, Result};

// Re-export commonly used types
pub use store::{ConfigEntry, ConfigStore};
pub use system::SystemConfig;

/// Default config directory ($XDG_CONFIG_HOME/monitor-configd)
pub fn default_config_dir() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(crate::constants::config::APP_DIR);
    path
}

/// Both config files as loaded at startup
///
/// A file that fails to load is replaced by an empty in-memory default and its
/// error is kept in `errors` for the caller to report.
pub struct LoadedConfig {
    pub store: ConfigStore,
    pub system: SystemConfig,
    pub errors: Vec<DisplayError>,
}

impl LoadedConfig {
    pub fn load(dir: &Path) -> Self {
        use crate::constants::config::{DISPLAY_FILENAME, SYSTEM_FILENAME};

        let mut errors = Vec::new();
        let store_path = dir.join(DISPLAY_FILENAME);
        let store = ConfigStore::load(&store_path).unwrap_or_else(|e| {
            errors.push(e);
            ConfigStore::empty(store_path)
        });
        let system_path = dir.join(SYSTEM_FILENAME);
        let system = SystemConfig::load(&system_path).unwrap_or_else(|e| {
            errors.push(e);
            SystemConfig::empty(system_path)
        });

        Self { store, system, errors }
    }
}

/// Serialize `value` as pretty JSON and atomically replace `path`
///
/// The data is written to a temp file in the same directory, synced, then
/// renamed over the target. On failure the previous file is left intact.
pub fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| DisplayError::persistence(path, std::io::Error::other(e)))?;

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| DisplayError::persistence(dir, e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| DisplayError::persistence(dir, e))?;
    tmp.write_all(&json)
        .and_then(|_| tmp.write_all(b"\n"))
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| DisplayError::persistence(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| DisplayError::persistence(path, e.error))?;

    info!(path = %path.display(), bytes = json.len(), "Wrote config file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_write_atomic_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.json");

        let first = BTreeMap::from([("a".to_string(), 1)]);
        write_atomic(&path, &first).unwrap();
        let second = BTreeMap::from([("b".to_string(), 2)]);
        write_atomic(&path, &second).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let parsed: BTreeMap<String, i32> = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed, second);

        // No temp files left behind
        let leftovers = fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_loaded_config_falls_back_on_malformed_store() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("display.json"), "garbage").unwrap();

        let loaded = LoadedConfig::load(dir.path());
        assert_eq!(loaded.store.len(), 0);
        assert_eq!(loaded.errors.len(), 1);
        assert!(matches!(loaded.errors[0], DisplayError::MalformedConfig { .. }));
    }

    #[test]
    fn test_write_atomic_fails_when_target_is_directory() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("taken");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("keep"), "x").unwrap();

        let err = write_atomic(&target, &BTreeMap::<String, i32>::new()).unwrap_err();
        assert!(matches!(err, DisplayError::Persistence { .. }));
        assert!(target.join("keep").exists());
    }
}
