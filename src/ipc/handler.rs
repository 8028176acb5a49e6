//! IPC request handler for the daemon

use anyhow::Result;
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info, warn};

use super::{read_message, write_message, DisplayRequest, DisplayResponse, DisplayServer};
use crate::error::DisplayError;
use crate::manager::Manager;

/// Run one request against the manager
pub fn dispatch(manager: &Manager, request: DisplayRequest) -> DisplayResponse {
    debug!(request = ?request, "Dispatching IPC request");
    let result: std::result::Result<DisplayResponse, DisplayError> = match request {
        DisplayRequest::ListOutputNames => Ok(DisplayResponse::OutputNames(manager.list_output_names())),
        DisplayRequest::SetPrimary(name) => manager.set_primary(&name).map(|_| DisplayResponse::Ready),
        DisplayRequest::SwitchMode { mode, name } => manager.switch_mode(mode, &name).map(|_| DisplayResponse::Ready),
        DisplayRequest::ApplyChanges => manager.apply_changes().map(|_| DisplayResponse::Ready),
        DisplayRequest::ResetChanges => manager.reset_changes().map(|_| DisplayResponse::Ready),
        DisplayRequest::Save => manager.save().map(|_| DisplayResponse::Ready),
        DisplayRequest::DeleteCustomConfig => manager.delete_custom_config().map(|_| DisplayResponse::Ready),
        DisplayRequest::Reset => manager.reset().map(|_| DisplayResponse::Ready),
        DisplayRequest::SetMonitorPosition { name, x, y } => {
            manager.set_monitor_position(&name, x, y).map(|_| DisplayResponse::Ready)
        }
        DisplayRequest::SetMonitorResolution { name, width, height } => {
            manager.set_monitor_resolution(&name, width, height).map(|_| DisplayResponse::Ready)
        }
        DisplayRequest::SetMonitorEnabled { name, enabled } => {
            manager.set_monitor_enabled(&name, enabled).map(|_| DisplayResponse::Ready)
        }
        DisplayRequest::GetScaleFactors => Ok(DisplayResponse::ScaleFactors(manager.scale_factors())),
        DisplayRequest::SetScaleFactors(factors) => manager.set_scale_factors(factors).map(|_| DisplayResponse::Ready),
        DisplayRequest::GetState => Ok(DisplayResponse::State {
            mode: manager.display_mode().into(),
            primary: manager.primary(),
            fingerprint: manager.fingerprint(),
            has_changed: manager.has_changed(),
        }),
        DisplayRequest::Ping => Ok(DisplayResponse::Pong),
    };

    result.unwrap_or_else(|e| {
        if e.is_validation() {
            warn!(error = %e, "IPC request rejected");
        } else {
            error!(error = %e, "IPC request failed");
        }
        DisplayResponse::Error(e.to_string())
    })
}

/// Spawn IPC listener thread; each client gets its own handler thread
pub fn spawn_ipc_listener(server: DisplayServer, manager: Arc<Manager>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        info!(socket = ?server.path(), "IPC listener started");
        loop {
            match server.accept() {
                Ok(stream) => {
                    let manager = manager.clone();
                    thread::spawn(move || {
                        if let Err(e) = serve_client(stream, &manager) {
                            debug!(error = ?e, "IPC client disconnected");
                        }
                    });
                }
                Err(e) => {
                    error!(error = ?e, "IPC listener crashed");
                    break;
                }
            }
        }
    })
}

fn serve_client(mut stream: UnixStream, manager: &Manager) -> Result<()> {
    info!("Client connected");
    loop {
        let request: DisplayRequest = read_message(&mut stream)?;
        let response = dispatch(manager, request);
        write_message(&mut stream, &response)?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::RecordingBackend;
    use crate::config::{ConfigStore, SystemConfig};
    use crate::monitor::tests::monitor;
    use crate::monitor::MonitorSet;
    use crate::scale::ScaleFactors;

    fn manager(dir: &tempfile::TempDir) -> Manager {
        let backend = Arc::new(RecordingBackend::with_monitors(
            MonitorSet::new(vec![monitor("HDMI-1", 0, 1920, 1080), monitor("eDP-1", 1920, 1366, 768)]),
            "eDP-1",
        ));
        let mut manager = Manager::new(
            ConfigStore::empty(dir.path().join("display.json")),
            SystemConfig::empty(dir.path().join("system.json")),
        );
        manager.complete_init(backend, None).unwrap();
        manager
    }

    #[test]
    fn test_dispatch_list_output_names() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);
        assert_eq!(
            dispatch(&manager, DisplayRequest::ListOutputNames),
            DisplayResponse::OutputNames(vec!["HDMI-1".to_string(), "eDP-1".to_string()])
        );
    }

    #[test]
    fn test_dispatch_reports_errors_as_strings() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);
        let response = dispatch(&manager, DisplayRequest::SwitchMode { mode: 3, name: "VGA-9".to_string() });
        assert_eq!(response, DisplayResponse::Error("Unknown monitor: VGA-9".to_string()));
        let response = dispatch(&manager, DisplayRequest::SwitchMode { mode: 200, name: String::new() });
        assert_eq!(response, DisplayResponse::Error("Invalid display mode: 200".to_string()));
    }

    #[test]
    fn test_dispatch_state_after_switch() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);
        assert_eq!(
            dispatch(&manager, DisplayRequest::SwitchMode { mode: 3, name: "HDMI-1".to_string() }),
            DisplayResponse::Ready
        );
        assert_eq!(
            dispatch(&manager, DisplayRequest::GetState),
            DisplayResponse::State {
                mode: 3,
                primary: "HDMI-1".to_string(),
                fingerprint: "HDMI-1,eDP-1".to_string(),
                has_changed: true,
            }
        );
    }

    #[test]
    fn test_dispatch_scale_factors() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);
        let factors = ScaleFactors::uniform(1.5);
        assert_eq!(dispatch(&manager, DisplayRequest::SetScaleFactors(factors.clone())), DisplayResponse::Ready);
        assert_eq!(dispatch(&manager, DisplayRequest::GetScaleFactors), DisplayResponse::ScaleFactors(factors));
    }

    #[test]
    fn test_serve_client_over_socket_pair() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(manager(&dir));
        let (mut client, server) = UnixStream::pair().unwrap();

        let handle = {
            let manager = manager.clone();
            thread::spawn(move || serve_client(server, &manager))
        };

        write_message(&mut client, &DisplayRequest::Ping).unwrap();
        let response: DisplayResponse = read_message(&mut client).unwrap();
        assert_eq!(response, DisplayResponse::Pong);

        drop(client);
        assert!(handle.join().unwrap().is_err());
    }
}
