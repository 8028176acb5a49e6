//! Display mode state machine
//!
//! Switching computes a new arrangement from the current one without touching
//! it, so a failed switch leaves nothing half-applied. Persisting and
//! committing the result are the caller's job.

use std::collections::HashSet;
use std::fmt;
use tracing::debug;

use crate::config::ConfigEntry;
use crate::error::{DisplayError, Result};
use crate::monitor::MonitorSet;
use crate::types::{Position, Resolution};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    Custom,
    Mirror,
    Extend,
    OnlyOne,
}

impl TryFrom<u8> for DisplayMode {
    type Error = DisplayError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Custom),
            1 => Ok(Self::Mirror),
            2 => Ok(Self::Extend),
            3 => Ok(Self::OnlyOne),
            other => Err(DisplayError::InvalidMode(other)),
        }
    }
}

impl From<DisplayMode> for u8 {
    fn from(mode: DisplayMode) -> u8 {
        match mode {
            DisplayMode::Custom => 0,
            DisplayMode::Mirror => 1,
            DisplayMode::Extend => 2,
            DisplayMode::OnlyOne => 3,
        }
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Custom => "custom",
            Self::Mirror => "mirror",
            Self::Extend => "extend",
            Self::OnlyOne => "only-one",
        };
        f.write_str(name)
    }
}

/// Monitors plus the chosen primary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Arrangement {
    pub monitors: MonitorSet,
    pub primary: String,
}

impl Arrangement {
    pub fn new(monitors: MonitorSet, primary: impl Into<String>) -> Self {
        Self {
            monitors,
            primary: primary.into(),
        }
    }

    /// Keep the primary if still eligible, otherwise pick the first eligible by name
    ///
    /// With nothing eligible the primary stays on a member of the set (the
    /// current one if it is still connected), never on an empty name.
    fn settle_primary(&mut self) {
        let keep = self
            .monitors
            .get_by_name(&self.primary)
            .map(|m| m.can_be_primary())
            .unwrap_or(false);
        if keep {
            return;
        }
        if let Some(eligible) = self.monitors.first_eligible() {
            self.primary = eligible.name.clone();
        } else if self.monitors.get_by_name(&self.primary).is_err() {
            self.primary = self.monitors.list_names().into_iter().next().unwrap_or_default();
        }
    }
}

/// Applies a [`DisplayMode`] to an arrangement
pub struct ModeSwitcher<'a> {
    current: &'a Arrangement,
    saved: Option<&'a ConfigEntry>,
    has_edits: bool,
}

impl<'a> ModeSwitcher<'a> {
    /// `saved` is the stored entry for the current fingerprint, `has_edits`
    /// whether `current` holds unapplied manual edits.
    pub fn new(current: &'a Arrangement, saved: Option<&'a ConfigEntry>, has_edits: bool) -> Self {
        Self {
            current,
            saved,
            has_edits,
        }
    }

    pub fn switch(&self, mode: DisplayMode, name: &str) -> Result<Arrangement> {
        debug!(mode = %mode, name = %name, "Switching display mode");
        match mode {
            DisplayMode::Mirror => self.mirror(),
            DisplayMode::Extend => self.extend(),
            DisplayMode::OnlyOne => self.only_one(name),
            DisplayMode::Custom => self.custom(),
        }
    }

    fn mirror(&self) -> Result<Arrangement> {
        if self.current.monitors.is_empty() {
            return Err(DisplayError::NoMonitorsConnected);
        }
        let resolution = mirror_resolution(&self.current.monitors);

        let mut next = self.current.clone();
        for monitor in next.monitors.iter_mut() {
            monitor.enabled = true;
            monitor.position = Position::default();
            monitor.resolution = resolution;
        }
        next.settle_primary();
        Ok(next)
    }

    fn extend(&self) -> Result<Arrangement> {
        if self.current.monitors.is_empty() {
            return Err(DisplayError::NoMonitorsConnected);
        }
        let mut next = self.current.clone();
        for monitor in next.monitors.iter_mut() {
            monitor.enabled = true;
            if monitor.resolution.is_zero() {
                monitor.resolution = monitor.best_mode();
            }
        }
        next.settle_primary();

        // Primary first, then left-to-right as currently placed
        let mut order: Vec<(bool, i16, String)> = next
            .monitors
            .iter()
            .map(|m| (m.name != next.primary, m.position.x, m.name.clone()))
            .collect();
        order.sort();

        let total: i32 = next.monitors.iter().map(|m| m.resolution.width as i32).sum();
        if total > i16::MAX as i32 {
            return Err(DisplayError::ScreenTooLarge(total));
        }

        let mut x: i16 = 0;
        for (_, _, name) in order {
            let monitor = next.monitors.get_by_name_mut(&name)?;
            monitor.position = Position::new(x, 0);
            x = x.saturating_add_unsigned(monitor.resolution.width);
        }
        Ok(next)
    }

    fn only_one(&self, name: &str) -> Result<Arrangement> {
        let target = self.current.monitors.get_by_name(name)?;
        let resolution = if target.resolution.is_zero() {
            target.best_mode()
        } else {
            target.resolution
        };

        let mut next = self.current.clone();
        for monitor in next.monitors.iter_mut() {
            if monitor.name == name {
                monitor.enabled = true;
                monitor.position = Position::default();
                monitor.resolution = resolution;
            } else {
                monitor.enabled = false;
            }
        }
        next.primary = name.to_string();
        Ok(next)
    }

    fn custom(&self) -> Result<Arrangement> {
        if self.current.monitors.is_empty() {
            return Err(DisplayError::NoMonitorsConnected);
        }
        match self.saved {
            Some(entry) => {
                let mut next = self.current.clone();
                for info in &entry.base_infos {
                    next.monitors.apply_base_info(info);
                }
                next.primary = entry.primary.clone();
                next.settle_primary();
                Ok(next)
            }
            None if self.has_edits => Ok(self.current.clone()),
            None => Err(DisplayError::ConfigNotFound(self.current.monitors.fingerprint())),
        }
    }
}

/// Largest mode common to every monitor, else the smallest current resolution
fn mirror_resolution(monitors: &MonitorSet) -> Resolution {
    let mut common: Option<HashSet<Resolution>> = None;
    for monitor in monitors.iter() {
        let modes: HashSet<Resolution> = monitor.modes.iter().copied().collect();
        common = Some(match common {
            Some(acc) => acc.intersection(&modes).copied().collect(),
            None => modes,
        });
    }

    common
        .and_then(|set| set.into_iter().max_by_key(|r| (r.area(), r.width)))
        .or_else(|| {
            monitors
                .iter()
                .map(|m| m.resolution)
                .filter(|r| !r.is_zero())
                .min_by_key(|r| (r.area(), r.width))
        })
        .unwrap_or_default()
}
