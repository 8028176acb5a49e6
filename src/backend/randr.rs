//! X11 RandR output backend

use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info, warn};
use x11rb::connection::Connection;
use x11rb::protocol::randr::{
    self, ConnectionExt as RandrExt, GetScreenResourcesCurrentReply, NotifyMask, Rotation, SetConfig,
};
use x11rb::protocol::xproto::Window;
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;

use super::DisplayBackend;
use crate::constants::x11::{MM_PER_INCH, RANDR_MAJOR, RANDR_MINOR};
use crate::constants::scale::BASE_DPI;
use crate::manager::Manager;
use crate::mode::Arrangement;
use crate::monitor::{Monitor, MonitorSet};
use crate::types::{Position, Resolution};

/// One connected output as RandR reports it
struct OutputState {
    id: randr::Output,
    name: String,
    /// Current crtc, `x11rb::NONE` when off
    crtc: randr::Crtc,
    crtcs: Vec<randr::Crtc>,
    modes: Vec<randr::Mode>,
}

pub struct RandrBackend {
    conn: RustConnection,
    root: Window,
}

impl RandrBackend {
    pub fn connect() -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(None).context("Failed to connect to X11 server")?;
        let root = conn.setup().roots[screen_num].root;
        let version = conn
            .randr_query_version(RANDR_MAJOR, RANDR_MINOR)
            .context("Failed to query RandR version")?
            .reply()
            .context("RandR extension not available")?;
        info!(
            screen = screen_num,
            major = version.major_version,
            minor = version.minor_version,
            "Connected to X11 RandR"
        );
        Ok(Self { conn, root })
    }

    fn resources(&self) -> Result<GetScreenResourcesCurrentReply> {
        self.conn
            .randr_get_screen_resources_current(self.root)
            .context("Failed to query screen resources")?
            .reply()
            .context("Failed to get reply for screen resources")
    }

    fn connected_outputs(&self, res: &GetScreenResourcesCurrentReply) -> Result<Vec<OutputState>> {
        let mut outputs = Vec::new();
        for &id in &res.outputs {
            let info = self
                .conn
                .randr_get_output_info(id, res.config_timestamp)
                .context(format!("Failed to query output {}", id))?
                .reply()
                .context(format!("Failed to get output info for {}", id))?;
            if info.connection != randr::Connection::CONNECTED {
                continue;
            }
            let name = String::from_utf8_lossy(&info.name).into_owned();
            outputs.push(OutputState {
                id,
                name,
                crtc: info.crtc,
                crtcs: info.crtcs,
                modes: info.modes,
            });
        }
        Ok(outputs)
    }

    fn output_primary(&self) -> Result<randr::Output> {
        Ok(self
            .conn
            .randr_get_output_primary(self.root)
            .context("Failed to query primary output")?
            .reply()
            .context("Failed to get reply for primary output")?
            .output)
    }
}

fn mode_sizes(res: &GetScreenResourcesCurrentReply) -> HashMap<randr::Mode, Resolution> {
    res.modes
        .iter()
        .map(|m| (m.id, Resolution::new(m.width, m.height)))
        .collect()
}

/// Physical size for a pixel length at the baseline DPI
fn to_mm(pixels: u16) -> u32 {
    (pixels as f64 * MM_PER_INCH / BASE_DPI).round() as u32
}

/// Mode and crtc chosen for one enabled monitor
struct CrtcAssignment<'a> {
    monitor: &'a Monitor,
    output: randr::Output,
    mode: randr::Mode,
    crtc: randr::Crtc,
}

/// Resolve a mode and a free crtc for every enabled monitor
///
/// Fails without side effects when any monitor cannot be driven.
fn plan_crtcs<'a>(
    sizes: &HashMap<randr::Mode, Resolution>,
    outputs: &[OutputState],
    arrangement: &'a Arrangement,
) -> Result<Vec<CrtcAssignment<'a>>> {
    let by_name: HashMap<&str, &OutputState> = outputs.iter().map(|o| (o.name.as_str(), o)).collect();
    let mut used_crtcs = HashSet::new();
    let mut plan = Vec::new();

    for monitor in arrangement.monitors.iter().filter(|m| m.enabled) {
        let Some(output) = by_name.get(monitor.name.as_str()) else {
            warn!(name = %monitor.name, "Output vanished before commit, skipping");
            continue;
        };
        let mode = output
            .modes
            .iter()
            .copied()
            .find(|id| sizes.get(id) == Some(&monitor.resolution))
            .with_context(|| format!("No {} mode on {}", monitor.resolution, monitor.name))?;

        let crtc = std::iter::once(output.crtc)
            .filter(|c| *c != x11rb::NONE)
            .chain(output.crtcs.iter().copied())
            .find(|c| !used_crtcs.contains(c))
            .with_context(|| format!("No free crtc for {}", monitor.name))?;
        used_crtcs.insert(crtc);

        plan.push(CrtcAssignment {
            monitor,
            output: output.id,
            mode,
            crtc,
        });
    }
    Ok(plan)
}

/// Bounding box of the enabled monitors, at least 1x1
fn screen_size(arrangement: &Arrangement) -> (u16, u16) {
    let enabled: Vec<&Monitor> = arrangement.monitors.iter().filter(|m| m.enabled).collect();
    let extent = |edge: fn(&Monitor) -> i32| {
        enabled
            .iter()
            .map(|m| edge(m))
            .max()
            .unwrap_or(0)
            .clamp(1, u16::MAX as i32) as u16
    };
    (
        extent(|m| m.position.x as i32 + m.resolution.width as i32),
        extent(|m| m.position.y as i32 + m.resolution.height as i32),
    )
}

impl DisplayBackend for RandrBackend {
    fn query_monitors(&self) -> Result<Arrangement> {
        let res = self.resources()?;
        let sizes = mode_sizes(&res);
        let primary_id = self.output_primary()?;

        let mut monitors = Vec::new();
        let mut primary = String::new();
        for output in self.connected_outputs(&res)? {
            let modes: Vec<Resolution> = output
                .modes
                .iter()
                .filter_map(|id| sizes.get(id).copied())
                .collect();

            let mut monitor = Monitor::new(
                output.name.clone(),
                Position::default(),
                modes.first().copied().unwrap_or_default(),
            )
            .with_modes(modes);

            if output.crtc == x11rb::NONE {
                monitor.enabled = false;
            } else {
                let crtc = self
                    .conn
                    .randr_get_crtc_info(output.crtc, res.config_timestamp)
                    .context(format!("Failed to query crtc for {}", output.name))?
                    .reply()
                    .context(format!("Failed to get crtc info for {}", output.name))?;
                monitor.position = Position::new(crtc.x, crtc.y);
                monitor.resolution = Resolution::new(crtc.width, crtc.height);
            }

            if output.id == primary_id {
                primary = output.name.clone();
            }
            debug!(name = %monitor.name, enabled = monitor.enabled, resolution = %monitor.resolution, "Discovered output");
            monitors.push(monitor);
        }

        Ok(Arrangement::new(MonitorSet::new(monitors), primary))
    }

    fn commit(&self, arrangement: &Arrangement) -> Result<()> {
        let res = self.resources()?;
        let outputs = self.connected_outputs(&res)?;
        let plan = plan_crtcs(&mode_sizes(&res), &outputs, arrangement)?;

        // Nothing has been touched yet; from here on every crtc is reprogrammed
        for output in &outputs {
            if output.crtc == x11rb::NONE {
                continue;
            }
            self.conn
                .randr_set_crtc_config(
                    output.crtc,
                    x11rb::CURRENT_TIME,
                    res.config_timestamp,
                    0,
                    0,
                    x11rb::NONE,
                    Rotation::ROTATE0,
                    &[],
                )
                .context(format!("Failed to disable crtc for {}", output.name))?
                .reply()
                .context(format!("Failed to get reply disabling {}", output.name))?;
        }

        let (width, height) = screen_size(arrangement);
        self.conn
            .randr_set_screen_size(self.root, width, height, to_mm(width), to_mm(height))
            .context(format!("Failed to set screen size {}x{}", width, height))?;

        for step in &plan {
            let monitor = step.monitor;
            let reply = self
                .conn
                .randr_set_crtc_config(
                    step.crtc,
                    x11rb::CURRENT_TIME,
                    res.config_timestamp,
                    monitor.position.x,
                    monitor.position.y,
                    step.mode,
                    Rotation::ROTATE0,
                    &[step.output],
                )
                .context(format!("Failed to configure {}", monitor.name))?
                .reply()
                .context(format!("Failed to get reply configuring {}", monitor.name))?;
            if reply.status != SetConfig::SUCCESS {
                anyhow::bail!("RandR rejected config for {}: {:?}", monitor.name, reply.status);
            }
            debug!(name = %monitor.name, x = monitor.position.x, y = monitor.position.y, resolution = %monitor.resolution, "Configured output");
        }

        if let Some(output) = outputs.iter().find(|o| o.name == arrangement.primary) {
            self.conn
                .randr_set_output_primary(self.root, output.id)
                .context(format!("Failed to set primary output {}", arrangement.primary))?;
        }

        self.conn.flush().context("Failed to flush X11 connection after commit")?;
        Ok(())
    }

    fn set_primary(&self, name: &str) -> Result<()> {
        let res = self.resources()?;
        let output = self
            .connected_outputs(&res)?
            .into_iter()
            .find(|o| o.name == name)
            .with_context(|| format!("Output {} is not connected", name))?;
        self.conn
            .randr_set_output_primary(self.root, output.id)
            .context(format!("Failed to set primary output {}", name))?;
        self.conn.flush().context("Failed to flush X11 connection")?;
        Ok(())
    }
}

/// Watch RandR notifications and feed new topologies to the manager
///
/// Only fingerprint changes are forwarded; our own commits also raise
/// screen-change events and must not loop back.
pub fn spawn_hotplug_listener(
    manager: Arc<Manager>,
    backend: Arc<dyn DisplayBackend>,
) -> Result<thread::JoinHandle<()>> {
    let (conn, screen_num) = x11rb::connect(None).context("Failed to open X11 connection for hotplug events")?;
    let root = conn.setup().roots[screen_num].root;
    conn.randr_select_input(root, NotifyMask::SCREEN_CHANGE | NotifyMask::OUTPUT_CHANGE)
        .context("Failed to select RandR events")?;
    conn.flush().context("Failed to flush X11 connection")?;

    Ok(thread::spawn(move || {
        info!("Hotplug listener started");
        loop {
            let event = match conn.wait_for_event() {
                Ok(event) => event,
                Err(e) => {
                    error!(error = %e, "X11 connection lost, hotplug listener exiting");
                    break;
                }
            };
            if !matches!(event, Event::RandrScreenChangeNotify(_) | Event::RandrNotify(_)) {
                continue;
            }

            let detected = match backend.query_monitors() {
                Ok(detected) => detected,
                Err(e) => {
                    warn!(error = %e, "Failed to re-read outputs");
                    continue;
                }
            };
            if detected.monitors.fingerprint() == manager.fingerprint() {
                continue;
            }
            if let Err(e) = manager.handle_topology_change(detected) {
                error!(error = %e, "Failed to apply new topology");
            }
        }
    }))
}
