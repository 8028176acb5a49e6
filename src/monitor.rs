//! Live monitor topology
//!
//! `MonitorSet` is the in-memory view of the connected outputs. Its
//! fingerprint identifies the physical arrangement and keys persisted layouts.

use serde::{Deserialize, Serialize};

use crate::error::{DisplayError, Result};
use crate::types::{Position, Resolution};

/// One connected output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Monitor {
    /// Stable output name from the hardware layer (e.g. "HDMI-1")
    pub name: String,
    pub enabled: bool,
    pub position: Position,
    pub resolution: Resolution,
    /// Resolutions the hardware reports as supported (not persisted)
    pub modes: Vec<Resolution>,
}

impl Monitor {
    pub fn new(name: impl Into<String>, position: Position, resolution: Resolution) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            position,
            resolution,
            modes: vec![resolution],
        }
    }

    pub fn with_modes(mut self, modes: Vec<Resolution>) -> Self {
        self.modes = modes;
        self
    }

    /// Primary-candidate eligibility
    pub fn can_be_primary(&self) -> bool {
        self.enabled && !self.resolution.is_zero()
    }

    /// Largest supported mode, falling back to the current resolution
    pub fn best_mode(&self) -> Resolution {
        self.modes
            .iter()
            .copied()
            .max_by_key(|m| m.area())
            .unwrap_or(self.resolution)
    }

    pub fn base_info(&self) -> MonitorBaseInfo {
        MonitorBaseInfo {
            name: self.name.clone(),
            enabled: self.enabled,
            x: self.position.x,
            y: self.position.y,
            width: self.resolution.width,
            height: self.resolution.height,
        }
    }

    fn apply_base_info(&mut self, info: &MonitorBaseInfo) {
        self.enabled = info.enabled;
        self.position = Position::new(info.x, info.y);
        self.resolution = Resolution::new(info.width, info.height);
    }
}

/// Persisted subset of a monitor needed to restore a layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorBaseInfo {
    pub name: String,
    pub enabled: bool,
    pub x: i16,
    pub y: i16,
    pub width: u16,
    pub height: u16,
}

/// Currently connected monitors, in discovery order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorSet {
    monitors: Vec<Monitor>,
}

impl MonitorSet {
    pub fn new(monitors: Vec<Monitor>) -> Self {
        Self { monitors }
    }

    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Monitor> {
        self.monitors.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Monitor> {
        self.monitors.iter_mut()
    }

    /// Topology identifier: sorted, de-duplicated names joined by ','
    ///
    /// Empty when no monitor is connected; callers that persist must reject it.
    pub fn fingerprint(&self) -> String {
        let mut names: Vec<&str> = self.monitors.iter().map(|m| m.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        names.join(",")
    }

    pub fn get_by_name(&self, name: &str) -> Result<&Monitor> {
        self.monitors
            .iter()
            .find(|m| m.name == name)
            .ok_or_else(|| DisplayError::UnknownMonitor(name.to_string()))
    }

    pub fn get_by_name_mut(&mut self, name: &str) -> Result<&mut Monitor> {
        self.monitors
            .iter_mut()
            .find(|m| m.name == name)
            .ok_or_else(|| DisplayError::UnknownMonitor(name.to_string()))
    }

    /// Names sorted ascending
    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.monitors.iter().map(|m| m.name.clone()).collect();
        names.sort();
        names
    }

    /// Persisted attributes of every monitor, sorted by name
    pub fn base_infos(&self) -> Vec<MonitorBaseInfo> {
        let mut infos: Vec<MonitorBaseInfo> = self.monitors.iter().map(Monitor::base_info).collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Overwrite one monitor from a stored base info. Returns false if the name is unknown.
    pub fn apply_base_info(&mut self, info: &MonitorBaseInfo) -> bool {
        match self.get_by_name_mut(&info.name) {
            Ok(monitor) => {
                monitor.apply_base_info(info);
                true
            }
            Err(_) => false,
        }
    }

    /// First primary-eligible monitor by name
    pub fn first_eligible(&self) -> Option<&Monitor> {
        self.monitors
            .iter()
            .filter(|m| m.can_be_primary())
            .min_by(|a, b| a.name.cmp(&b.name))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn monitor(name: &str, x: i16, width: u16, height: u16) -> Monitor {
        Monitor::new(name, Position::new(x, 0), Resolution::new(width, height))
    }

    #[test]
    fn test_fingerprint_is_order_independent() {
        let a = MonitorSet::new(vec![
            monitor("HDMI-1", 0, 1920, 1080),
            monitor("eDP-1", 1920, 1366, 768),
            monitor("DP-2", 3286, 2560, 1440),
        ]);
        let b = MonitorSet::new(vec![
            monitor("DP-2", 0, 2560, 1440),
            monitor("HDMI-1", 0, 1920, 1080),
            monitor("eDP-1", 0, 1366, 768),
        ]);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), "DP-2,HDMI-1,eDP-1");
    }

    #[test]
    fn test_fingerprint_ignores_layout_attributes() {
        let mut set = MonitorSet::new(vec![monitor("A", 0, 1920, 1080), monitor("B", 1920, 1920, 1080)]);
        let before = set.fingerprint();
        set.get_by_name_mut("B").unwrap().enabled = false;
        set.get_by_name_mut("A").unwrap().position = Position::new(500, 500);
        assert_eq!(set.fingerprint(), before);
    }

    #[test]
    fn test_fingerprint_empty_set() {
        assert_eq!(MonitorSet::default().fingerprint(), "");
    }

    #[test]
    fn test_get_by_name_missing() {
        let set = MonitorSet::new(vec![monitor("A", 0, 1920, 1080)]);
        assert!(set.get_by_name("A").is_ok());
        assert!(matches!(set.get_by_name("Z"), Err(DisplayError::UnknownMonitor(name)) if name == "Z"));
    }

    #[test]
    fn test_base_infos_sorted_by_name() {
        let set = MonitorSet::new(vec![
            monitor("VGA-1", 0, 1024, 768),
            monitor("DP-1", 1024, 1920, 1080),
        ]);
        let names: Vec<_> = set.base_infos().into_iter().map(|i| i.name).collect();
        assert_eq!(names, vec!["DP-1", "VGA-1"]);
        assert_eq!(set.list_names(), vec!["DP-1", "VGA-1"]);
    }

    #[test]
    fn test_apply_base_info_unknown_name_skipped() {
        let mut set = MonitorSet::new(vec![monitor("A", 0, 1920, 1080)]);
        let info = MonitorBaseInfo {
            name: "Ghost".to_string(),
            enabled: false,
            x: 10,
            y: 10,
            width: 640,
            height: 480,
        };
        assert!(!set.apply_base_info(&info));
        assert_eq!(set.get_by_name("A").unwrap().resolution, Resolution::new(1920, 1080));
    }

    #[test]
    fn test_primary_eligibility() {
        let mut m = monitor("A", 0, 1920, 1080);
        assert!(m.can_be_primary());
        m.enabled = false;
        assert!(!m.can_be_primary());
    }

    #[test]
    fn test_best_mode_prefers_largest_area() {
        let m = monitor("A", 0, 1280, 720).with_modes(vec![
            Resolution::new(1280, 720),
            Resolution::new(1920, 1080),
            Resolution::new(1600, 900),
        ]);
        assert_eq!(m.best_mode(), Resolution::new(1920, 1080));
    }
}
