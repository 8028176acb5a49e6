//! Application-wide constants
//!
//! This module contains all magic numbers and string literals used throughout
//! the daemon, providing a single source of truth for constant values.

/// Config file locations
pub mod config {
    /// Directory under the XDG config dir
    pub const APP_DIR: &str = "monitor-configd";

    /// Per-topology display layouts
    pub const DISPLAY_FILENAME: &str = "display.json";

    /// System-wide settings (scale factors)
    pub const SYSTEM_FILENAME: &str = "system.json";
}

/// Scale factor advisory constants
pub mod scale {
    /// Smallest comfortable screen width at scale 1.0
    pub const MIN_SCREEN_WIDTH: f64 = 1024.0;

    /// Smallest comfortable screen height at scale 1.0
    pub const MIN_SCREEN_HEIGHT: f64 = 768.0;

    /// Allowed scale steps, ascending
    pub const STEPS: [f64; 9] = [1.0, 1.25, 1.5, 1.75, 2.0, 2.25, 2.5, 2.75, 3.0];

    /// Wildcard scope applying to every output
    pub const ALL_OUTPUTS: &str = "ALL";

    /// Baseline DPI that corresponds to scale 1.0
    pub const BASE_DPI: f64 = 96.0;
}

/// IPC socket constants
pub mod ipc {
    /// Socket path relative to XDG_RUNTIME_DIR (or the cache dir)
    pub const SOCKET_NAME: &str = "monitor-configd/display.sock";

    /// Maximum message size (1 MB) to prevent DoS via memory exhaustion
    pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;
}

/// X11 protocol constants
pub mod x11 {
    /// X resource key for font DPI
    pub const XFT_DPI: &str = "Xft.dpi";

    /// Millimetres per inch, used to derive the physical screen size
    pub const MM_PER_INCH: f64 = 25.4;

    /// RandR version we speak
    pub const RANDR_MAJOR: u32 = 1;
    pub const RANDR_MINOR: u32 = 5;
}
