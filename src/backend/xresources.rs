//! Scale factor propagation through X resources
//!
//! Toolkits read `Xft.dpi` from the root window's RESOURCE_MANAGER property,
//! so the wildcard scale is published there as `96 * scale`.

use anyhow::{Context, Result};
use tracing::info;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{AtomEnum, ConnectionExt as _, PropMode, Window};
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as _;

use super::ScaleFactorSink;
use crate::constants::scale::{ALL_OUTPUTS, BASE_DPI};
use crate::constants::x11::XFT_DPI;
use crate::scale::ScaleFactors;

pub struct XResourcesSink {
    conn: RustConnection,
    root: Window,
}

impl XResourcesSink {
    pub fn connect() -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(None).context("Failed to connect to X11 server")?;
        let root = conn.setup().roots[screen_num].root;
        Ok(Self { conn, root })
    }

    fn read_resources(&self) -> Result<String> {
        let reply = self
            .conn
            .get_property(false, self.root, AtomEnum::RESOURCE_MANAGER, AtomEnum::STRING, 0, u32::MAX)
            .context("Failed to query RESOURCE_MANAGER")?
            .reply()
            .context("Failed to get reply for RESOURCE_MANAGER")?;
        Ok(String::from_utf8_lossy(&reply.value).into_owned())
    }
}

/// DPI advertised for a scale factor
pub fn dpi_for_scale(scale: f64) -> u32 {
    (BASE_DPI * scale).round() as u32
}

/// Replace (or append) `key` in an X resource database string
pub fn merge_resource(existing: &str, key: &str, value: &str) -> String {
    let prefix = format!("{}:", key);
    let mut lines: Vec<String> = existing
        .lines()
        .filter(|line| !line.trim().is_empty() && !line.starts_with(&prefix))
        .map(str::to_string)
        .collect();
    lines.push(format!("{}\t{}", prefix, value));

    let mut merged = lines.join("\n");
    merged.push('\n');
    merged
}

impl ScaleFactorSink for XResourcesSink {
    fn propagate(&self, factors: &ScaleFactors) -> Result<()> {
        let dpi = dpi_for_scale(factors.get(ALL_OUTPUTS));
        let merged = merge_resource(&self.read_resources()?, XFT_DPI, &dpi.to_string());

        self.conn
            .change_property8(
                PropMode::REPLACE,
                self.root,
                AtomEnum::RESOURCE_MANAGER,
                AtomEnum::STRING,
                merged.as_bytes(),
            )
            .context("Failed to write RESOURCE_MANAGER")?;
        self.conn.flush().context("Failed to flush X11 connection")?;
        info!(dpi, "Published Xft.dpi");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dpi_for_scale() {
        assert_eq!(dpi_for_scale(1.0), 96);
        assert_eq!(dpi_for_scale(1.25), 120);
        assert_eq!(dpi_for_scale(2.0), 192);
    }

    #[test]
    fn test_merge_resource_replaces_existing() {
        let existing = "Xcursor.theme:\tAdwaita\nXft.dpi:\t96\n";
        let merged = merge_resource(existing, "Xft.dpi", "144");
        assert_eq!(merged, "Xcursor.theme:\tAdwaita\nXft.dpi:\t144\n");
    }

    #[test]
    fn test_merge_resource_appends_to_empty() {
        assert_eq!(merge_resource("", "Xft.dpi", "120"), "Xft.dpi:\t120\n");
    }
}
