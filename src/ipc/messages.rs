//! IPC message types for client ↔ daemon communication

use serde::{Deserialize, Serialize};

use crate::scale::ScaleFactors;

/// Requests sent from a client to the daemon
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum DisplayRequest {
    /// Connected output names, sorted
    ListOutputNames,

    /// Make an output primary (persisted immediately)
    SetPrimary(String),

    /// Switch display mode; `name` is only used by OnlyOne
    SwitchMode { mode: u8, name: String },

    /// Commit pending layout changes to hardware
    ApplyChanges,

    /// Restore the stored layout for the current topology
    ResetChanges,

    /// Persist the current layout
    Save,

    /// Forget the stored layout for the current topology
    DeleteCustomConfig,

    /// Remove all stored layouts and extend
    Reset,

    // Manual edits, staged until ApplyChanges
    SetMonitorPosition { name: String, x: i16, y: i16 },
    SetMonitorResolution { name: String, width: u16, height: u16 },
    SetMonitorEnabled { name: String, enabled: bool },

    GetScaleFactors,
    SetScaleFactors(ScaleFactors),

    /// Mode, primary and dirty flag
    GetState,

    /// Health check
    Ping,
}

/// Responses sent from the daemon to a client
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum DisplayResponse {
    OutputNames(Vec<String>),

    ScaleFactors(ScaleFactors),

    State {
        mode: u8,
        primary: String,
        fingerprint: String,
        has_changed: bool,
    },

    /// Health check response
    Pong,

    /// Request processed successfully
    Ready,

    /// Error occurred
    Error(String),
}
