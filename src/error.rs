//! Display configuration error types

use std::path::PathBuf;
use thiserror::Error;

use crate::types::Resolution;

/// Result type for display configuration operations
pub type Result<T> = std::result::Result<T, DisplayError>;

/// Errors returned by the display configuration manager
///
/// Validation variants are raised before any state is touched. I/O and
/// hardware variants are raised after an attempted action and leave the
/// in-memory layout (and its dirty flag) as it was.
#[derive(Error, Debug)]
pub enum DisplayError {
    /// Topology is empty, nothing to arrange or persist
    #[error("No output connected")]
    NoMonitorsConnected,

    /// Name does not resolve to a connected monitor
    #[error("Unknown monitor: {0}")]
    UnknownMonitor(String),

    /// Monitor exists but cannot act as primary
    #[error("Monitor is disabled: {0}")]
    MonitorDisabled(String),

    /// Mode value outside the known set
    #[error("Invalid display mode: {0}")]
    InvalidMode(u8),

    /// Monitor does not report the requested mode
    #[error("Resolution {resolution} not supported by {name}")]
    UnsupportedResolution { name: String, resolution: Resolution },

    /// Extended layout does not fit the X11 coordinate space
    #[error("Combined screen width {0}px exceeds the X11 limit")]
    ScreenTooLarge(i32),

    /// Scale factor is not a positive finite number
    #[error("Invalid scale factor for {scope}: {value}")]
    InvalidScaleFactor { scope: String, value: f64 },

    /// Layout whose primary is not one of its monitors
    #[error("Layout for '{fingerprint}' names unknown primary '{primary}'")]
    InvalidEntry { fingerprint: String, primary: String },

    /// No stored layout for this topology
    #[error("No config found for '{0}'")]
    ConfigNotFound(String),

    /// Config file exists but cannot be parsed
    #[error("Malformed config file {}: {source}", path.display())]
    MalformedConfig {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Reading, writing or replacing a config file failed
    #[error("Failed to persist {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Display hardware rejected the layout
    #[error("Hardware commit failed: {0:#}")]
    HardwareCommitFailed(anyhow::Error),
}

impl DisplayError {
    pub(crate) fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            source,
        }
    }

    /// True for errors detected before any mutation
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::NoMonitorsConnected
                | Self::UnknownMonitor(_)
                | Self::MonitorDisabled(_)
                | Self::InvalidMode(_)
                | Self::ConfigNotFound(_)
                | Self::UnsupportedResolution { .. }
                | Self::ScreenTooLarge(_)
                | Self::InvalidScaleFactor { .. }
                | Self::InvalidEntry { .. }
        )
    }
}
