//! Display configuration manager
//!
//! Owns the live arrangement, the persisted layouts and the scale factors, and
//! sequences every externally visible operation across them.
//!
//! Locking: `layout` guards monitor mutation, `config` guards the persisted
//! state (ConfigStore + system settings). When both are needed `layout` is
//! always taken first.

use anyhow::anyhow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

use crate::backend::{DisplayBackend, ScaleFactorSink};
use crate::config::{ConfigEntry, ConfigStore, SystemConfig};
use crate::error::{DisplayError, Result};
use crate::mode::{Arrangement, DisplayMode, ModeSwitcher};
use crate::monitor::Monitor;
use crate::scale::ScaleFactors;
use crate::types::{Position, Resolution};

struct LayoutState {
    arrangement: Arrangement,
    mode: DisplayMode,
    has_changed: bool,
}

struct PersistedState {
    store: ConfigStore,
    system: SystemConfig,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct Manager {
    layout: Mutex<LayoutState>,
    config: Mutex<PersistedState>,
    backend: Option<Arc<dyn DisplayBackend>>,
    sink: Option<Arc<dyn ScaleFactorSink>>,
}

impl Manager {
    /// First init phase: persisted state only, no hardware yet
    ///
    /// Scale factors can already be read and written; they are propagated once
    /// [`Manager::complete_init`] attaches a sink.
    pub fn new(store: ConfigStore, system: SystemConfig) -> Self {
        Self {
            layout: Mutex::new(LayoutState {
                arrangement: Arrangement::default(),
                mode: DisplayMode::Extend,
                has_changed: false,
            }),
            config: Mutex::new(PersistedState { store, system }),
            backend: None,
            sink: None,
        }
    }

    /// Second init phase: attach collaborators and arrange the connected monitors
    pub fn complete_init(
        &mut self,
        backend: Arc<dyn DisplayBackend>,
        sink: Option<Arc<dyn ScaleFactorSink>>,
    ) -> Result<()> {
        let monitors = backend
            .query_monitors()
            .map_err(DisplayError::HardwareCommitFailed)?;
        self.backend = Some(backend);
        self.sink = sink;

        let factors = self.scale_factors();
        self.notify_scale_factors(&factors);

        self.handle_topology_change(monitors)
    }

    fn backend(&self) -> Result<&Arc<dyn DisplayBackend>> {
        self.backend
            .as_ref()
            .ok_or_else(|| DisplayError::HardwareCommitFailed(anyhow!("display backend not initialized")))
    }

    pub fn list_output_names(&self) -> Vec<String> {
        lock(&self.layout).arrangement.monitors.list_names()
    }

    pub fn display_mode(&self) -> DisplayMode {
        lock(&self.layout).mode
    }

    pub fn has_changed(&self) -> bool {
        lock(&self.layout).has_changed
    }

    pub fn primary(&self) -> String {
        lock(&self.layout).arrangement.primary.clone()
    }

    pub fn fingerprint(&self) -> String {
        lock(&self.layout).arrangement.monitors.fingerprint()
    }

    /// Set the primary output and persist right away
    pub fn set_primary(&self, name: &str) -> Result<()> {
        debug!(name = %name, "SetPrimary");
        let mut layout = lock(&self.layout);
        let monitor = layout.arrangement.monitors.get_by_name(name)?;
        if !monitor.can_be_primary() {
            return Err(DisplayError::MonitorDisabled(name.to_string()));
        }

        self.backend()?
            .set_primary(name)
            .map_err(DisplayError::HardwareCommitFailed)?;
        layout.arrangement.primary = name.to_string();
        info!(primary = %name, "Primary output changed");

        self.save_locked(&layout)
    }

    /// Switch mode using the wire value; persists on success
    pub fn switch_mode(&self, mode: u8, name: &str) -> Result<()> {
        let mode = DisplayMode::try_from(mode).inspect_err(|e| warn!(error = %e, "Rejected mode switch"))?;
        self.switch_to(mode, name)
    }

    pub fn switch_to(&self, mode: DisplayMode, name: &str) -> Result<()> {
        debug!(mode = %mode, name = %name, "SwitchMode");
        let mut layout = lock(&self.layout);
        let fingerprint = layout.arrangement.monitors.fingerprint();
        let saved = lock(&self.config).store.get(&fingerprint).cloned();

        let next = ModeSwitcher::new(&layout.arrangement, saved.as_ref(), layout.has_changed)
            .switch(mode, name)
            .inspect_err(|e| error!(mode = %mode, error = %e, "Switch mode failed"))?;

        layout.arrangement = next;
        layout.mode = mode;
        layout.has_changed = true;
        info!(mode = %mode, primary = %layout.arrangement.primary, "Display mode switched");

        self.save_locked(&layout)
    }

    /// Commit the in-memory layout to hardware; no-op when nothing changed
    pub fn apply_changes(&self) -> Result<()> {
        let primary_resolution = {
            let mut layout = lock(&self.layout);
            if !layout.has_changed {
                return Ok(());
            }
            self.commit_locked(&mut layout)?;
            primary_resolution(&layout.arrangement)
        };

        self.adjust_for(primary_resolution);
        Ok(())
    }

    /// Restore the stored layout for the current topology and commit it
    pub fn reset_changes(&self) -> Result<()> {
        let mut layout = lock(&self.layout);
        if !layout.has_changed {
            return Ok(());
        }

        let fingerprint = layout.arrangement.monitors.fingerprint();
        if fingerprint.is_empty() {
            warn!("No connected monitor found");
            return Err(DisplayError::NoMonitorsConnected);
        }
        let entry = lock(&self.config)
            .store
            .get(&fingerprint)
            .cloned()
            .ok_or_else(|| {
                warn!(fingerprint = %fingerprint, "No config found");
                DisplayError::ConfigNotFound(fingerprint.clone())
            })?;

        for info in &entry.base_infos {
            layout.arrangement.monitors.apply_base_info(info);
        }
        if layout.arrangement.monitors.get_by_name(&entry.primary).is_ok() {
            layout.arrangement.primary = entry.primary.clone();
        }
        self.commit_locked(&mut layout)
    }

    /// Persist the current layout for its topology
    ///
    /// Only single-monitor topologies and Custom mode are stored; other
    /// arrangements are reproducible from mode and fingerprint.
    pub fn save(&self) -> Result<()> {
        let layout = lock(&self.layout);
        self.save_locked(&layout)
    }

    pub fn delete_custom_config(&self) -> Result<()> {
        let fingerprint = self.fingerprint();
        let mut config = lock(&self.config);
        if !config.store.delete(&fingerprint) {
            debug!(fingerprint = %fingerprint, "No custom config to delete");
            return Ok(());
        }
        info!(fingerprint = %fingerprint, "Deleted custom config");
        config.store.write_file()
    }

    /// Drop every stored layout and fall back to Extend
    pub fn reset(&self) -> Result<()> {
        lock(&self.config).store.remove_file()?;
        self.switch_to(DisplayMode::Extend, "")
    }

    pub fn set_monitor_position(&self, name: &str, x: i16, y: i16) -> Result<()> {
        self.edit_monitor(name, |m| {
            m.position = Position::new(x, y);
            Ok(())
        })
    }

    /// Only modes the monitor reports are accepted
    pub fn set_monitor_resolution(&self, name: &str, width: u16, height: u16) -> Result<()> {
        let resolution = Resolution::new(width, height);
        self.edit_monitor(name, |m| {
            if !m.modes.contains(&resolution) {
                return Err(DisplayError::UnsupportedResolution {
                    name: m.name.clone(),
                    resolution,
                });
            }
            m.resolution = resolution;
            Ok(())
        })
    }

    pub fn set_monitor_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        self.edit_monitor(name, |m| {
            m.enabled = enabled;
            Ok(())
        })
    }

    fn edit_monitor(&self, name: &str, edit: impl FnOnce(&mut Monitor) -> Result<()>) -> Result<()> {
        let mut layout = lock(&self.layout);
        edit(layout.arrangement.monitors.get_by_name_mut(name)?)
            .inspect_err(|e| warn!(name = %name, error = %e, "Monitor edit rejected"))?;
        layout.mode = DisplayMode::Custom;
        layout.has_changed = true;
        debug!(name = %name, "Monitor edited");
        Ok(())
    }

    /// Replace the live monitors after a hotplug and arrange them
    ///
    /// A stored layout for the new topology wins (Custom mode), otherwise the
    /// monitors are extended. The result is committed immediately.
    pub fn handle_topology_change(&self, detected: Arrangement) -> Result<()> {
        let primary_resolution = {
            let mut layout = lock(&self.layout);
            let fingerprint = detected.monitors.fingerprint();
            info!(fingerprint = %fingerprint, count = detected.monitors.len(), "Monitor topology changed");

            if fingerprint.is_empty() {
                layout.arrangement = detected;
                layout.has_changed = false;
                return Ok(());
            }

            let saved = lock(&self.config).store.get(&fingerprint).cloned();
            let mode = if saved.is_some() {
                DisplayMode::Custom
            } else {
                DisplayMode::Extend
            };
            let next = ModeSwitcher::new(&detected, saved.as_ref(), false).switch(mode, "")?;

            layout.arrangement = next;
            layout.mode = mode;
            layout.has_changed = true;
            self.commit_locked(&mut layout)?;
            primary_resolution(&layout.arrangement)
        };

        self.adjust_for(primary_resolution);
        Ok(())
    }

    pub fn scale_factors(&self) -> ScaleFactors {
        lock(&self.config).system.settings.scale_factors.clone()
    }

    /// Store new scale factors; returns whether they differed
    ///
    /// Every value must be a positive finite number.
    pub fn set_scale_factors(&self, factors: ScaleFactors) -> Result<bool> {
        debug!(?factors, "setScaleFactors");
        if let Some((scope, value)) = factors.iter().find(|(_, v)| !v.is_finite() || *v <= 0.0) {
            warn!(scope, value, "Rejected scale factor");
            return Err(DisplayError::InvalidScaleFactor {
                scope: scope.to_string(),
                value,
            });
        }

        // Sink runs under the config lock so clients see changes in store order
        let mut config = lock(&self.config);
        let changed = Self::store_scale_factors_locked(&mut config, factors.clone())?;
        if changed {
            self.notify_scale_factors(&factors);
        }
        Ok(changed)
    }

    /// Clamp the stored scale into the range allowed for `width` x `height`
    ///
    /// Writes back and notifies only when the value actually changes.
    pub fn adjust_scale_factor(&self, width: u16, height: u16) -> Result<bool> {
        let mut config = lock(&self.config);
        let adjusted = config.system.settings.scale_factors.adjusted_for(width, height);
        if !Self::store_scale_factors_locked(&mut config, adjusted.clone())? {
            return Ok(false);
        }
        info!(scale = ?adjusted.all(), width, height, "Scale factor adjusted for screen size");
        self.notify_scale_factors(&adjusted);
        Ok(true)
    }

    fn store_scale_factors_locked(config: &mut PersistedState, factors: ScaleFactors) -> Result<bool> {
        if config.system.settings.scale_factors == factors {
            return Ok(false);
        }
        let previous = std::mem::replace(&mut config.system.settings.scale_factors, factors);
        if let Err(e) = config.system.save("scale factors changed") {
            warn!(error = %e, "Failed to save scale factors");
            config.system.settings.scale_factors = previous;
            return Err(e);
        }
        Ok(true)
    }

    fn notify_scale_factors(&self, factors: &ScaleFactors) {
        if let Some(sink) = &self.sink
            && let Err(e) = sink.propagate(factors)
        {
            warn!(error = %e, "Failed to propagate scale factors");
        }
    }

    fn adjust_for(&self, resolution: Option<Resolution>) {
        if let Some(res) = resolution
            && let Err(e) = self.adjust_scale_factor(res.width, res.height)
        {
            warn!(error = %e, "Failed to adjust scale factor");
        }
    }

    fn commit_locked(&self, layout: &mut LayoutState) -> Result<()> {
        self.backend()?
            .commit(&layout.arrangement)
            .map_err(|e| {
                error!(error = %e, "Apply changes failed");
                DisplayError::HardwareCommitFailed(e)
            })?;
        layout.has_changed = false;
        info!(fingerprint = %layout.arrangement.monitors.fingerprint(), "Layout committed");
        Ok(())
    }

    fn save_locked(&self, layout: &LayoutState) -> Result<()> {
        let fingerprint = layout.arrangement.monitors.fingerprint();
        if fingerprint.is_empty() {
            warn!("No output connected");
            return Err(DisplayError::NoMonitorsConnected);
        }
        if layout.arrangement.monitors.len() != 1 && layout.mode != DisplayMode::Custom {
            debug!(mode = %layout.mode, "Layout derivable from mode, not saving");
            return Ok(());
        }

        let entry = ConfigEntry {
            primary: layout.arrangement.primary.clone(),
            base_infos: layout.arrangement.monitors.base_infos(),
        };
        let mut config = lock(&self.config);
        config
            .store
            .set(&fingerprint, entry)
            .inspect_err(|e| error!(error = %e, "Refusing to store layout"))?;
        config.store.write_file()
    }
}

fn primary_resolution(arrangement: &Arrangement) -> Option<Resolution> {
    arrangement
        .monitors
        .get_by_name(&arrangement.primary)
        .ok()
        .map(|m| m.resolution)
        .filter(|r| !r.is_zero())
}
