//! System-wide display settings shared with display clients

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{DisplayError, Result};
use crate::scale::ScaleFactors;

/// Contents of system.json
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemSettings {
    #[serde(default)]
    pub scale_factors: ScaleFactors,
}

/// SystemSettings plus the file they live in
#[derive(Debug)]
pub struct SystemConfig {
    path: PathBuf,
    pub settings: SystemSettings,
}

impl SystemConfig {
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            settings: SystemSettings::default(),
        }
    }

    /// Load from disk. A missing file yields defaults.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::empty(path)),
            Err(e) => return Err(DisplayError::persistence(path, e)),
        };
        let settings = serde_json::from_str(&contents).map_err(|source| DisplayError::MalformedConfig {
            path: path.clone(),
            source,
        })?;
        info!(path = %path.display(), "Loaded system config");
        Ok(Self { path, settings })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, reason: &str) -> Result<()> {
        info!(reason = %reason, "Saving system config");
        super::write_atomic(&self.path, &self.settings)
    }
}
