#![forbid(unsafe_code)]

mod backend;
mod config;
mod constants;
mod error;
mod ipc;
mod manager;
mod mode;
mod monitor;
mod scale;
mod types;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn, Level as TraceLevel};
use tracing_subscriber::FmtSubscriber;

use backend::{randr, DisplayBackend, RandrBackend, ScaleFactorSink, XResourcesSink};
use config::LoadedConfig;
use constants::scale::ALL_OUTPUTS;
use ipc::{DisplayClient, DisplayRequest, DisplayResponse, DisplayServer};
use manager::Manager;
use mode::DisplayMode;
use scale::ScaleFactors;

#[derive(Parser, Debug)]
#[command(name = "monitor-configd", version, about = "Multi-monitor display configuration daemon")]
struct Cli {
    /// Directory holding display.json and system.json
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// IPC socket path
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    /// trace, debug, info, warn or error
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the daemon (default)
    Daemon {
        /// Login greeter session: initialise fully but do not expose the socket
        #[arg(long)]
        greeter: bool,
    },
    /// List connected outputs
    Outputs,
    /// Make an output primary
    SetPrimary { name: String },
    /// Switch display mode
    SwitchMode {
        #[arg(value_enum)]
        mode: ModeArg,
        /// Output to keep enabled for only-one
        name: Option<String>,
    },
    /// Commit pending changes to hardware
    Apply,
    /// Discard pending changes and restore the stored layout
    ResetChanges,
    /// Persist the current layout
    Save,
    /// Forget the stored layout for the current outputs
    DeleteCustom,
    /// Remove every stored layout and extend
    Reset,
    /// Show, or set, the global scale factor
    Scale { value: Option<f64> },
    /// Show mode, primary and pending-change flag
    State,
    /// Check that the daemon is alive
    Ping,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Custom,
    Mirror,
    Extend,
    OnlyOne,
}

impl From<ModeArg> for DisplayMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Custom => DisplayMode::Custom,
            ModeArg::Mirror => DisplayMode::Mirror,
            ModeArg::Extend => DisplayMode::Extend,
            ModeArg::OnlyOne => DisplayMode::OnlyOne,
        }
    }
}

fn init_logging(level: &str) -> Result<()> {
    let log_level = match level.to_lowercase().as_str() {
        "trace" => TraceLevel::TRACE,
        "debug" => TraceLevel::DEBUG,
        "warn" => TraceLevel::WARN,
        "error" => TraceLevel::ERROR,
        _ => TraceLevel::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();

    tracing::subscriber::set_global_default(subscriber).context("Failed to install tracing subscriber")
}

fn socket_path(cli: &Cli) -> Result<PathBuf> {
    match &cli.socket {
        Some(path) => Ok(path.clone()),
        None => ipc::default_socket_path(),
    }
}

fn run_daemon(cli: &Cli, greeter: bool) -> Result<()> {
    let config_dir = cli.config_dir.clone().unwrap_or_else(config::default_config_dir);
    info!(dir = %config_dir.display(), greeter, "Starting display daemon");

    let loaded = LoadedConfig::load(&config_dir);
    for e in &loaded.errors {
        error!(error = %e, "Config unusable, continuing with defaults");
    }
    info!(
        display = %loaded.store.path().display(),
        system = %loaded.system.path().display(),
        layouts = loaded.store.len(),
        "Config ready"
    );
    let mut manager = Manager::new(loaded.store, loaded.system);

    let backend: Arc<dyn DisplayBackend> = Arc::new(RandrBackend::connect()?);
    let sink: Option<Arc<dyn ScaleFactorSink>> = match XResourcesSink::connect() {
        Ok(sink) => Some(Arc::new(sink)),
        Err(e) => {
            warn!(error = %e, "Scale factors will not be propagated");
            None
        }
    };
    if let Err(e) = manager.complete_init(backend.clone(), sink) {
        error!(error = %e, "Initial layout could not be applied");
    }
    let manager = Arc::new(manager);

    let _hotplug = randr::spawn_hotplug_listener(manager.clone(), backend)
        .inspect_err(|e| warn!(error = %e, "Continuing without hotplug support"))
        .ok();

    let socket = if greeter {
        info!("Greeter mode, IPC socket not exported");
        None
    } else {
        let server = DisplayServer::bind_to(socket_path(cli)?)?;
        let path = server.path().to_path_buf();
        ipc::spawn_ipc_listener(server, manager.clone());
        Some(path)
    };

    let mut signals = Signals::new([SIGINT, SIGTERM]).context("Failed to register signal handlers")?;
    if let Some(signal) = signals.forever().next() {
        info!(signal, "Shutting down");
    }
    if let Some(path) = socket {
        let _ = std::fs::remove_file(path);
    }
    Ok(())
}

/// Merge a global scale into the existing per-output mapping
fn with_global_scale(mut current: ScaleFactors, value: f64) -> ScaleFactors {
    current.set(ALL_OUTPUTS, value);
    current
}

/// `current_scale` is only consulted by `scale <value>`
fn request_for(
    command: &Command,
    current_scale: impl FnOnce() -> Result<ScaleFactors>,
) -> Result<DisplayRequest> {
    Ok(match command {
        Command::Daemon { .. } => bail!("daemon is not a client request"),
        Command::Outputs => DisplayRequest::ListOutputNames,
        Command::SetPrimary { name } => DisplayRequest::SetPrimary(name.clone()),
        Command::SwitchMode { mode, name } => DisplayRequest::SwitchMode {
            mode: DisplayMode::from(*mode).into(),
            name: name.clone().unwrap_or_default(),
        },
        Command::Apply => DisplayRequest::ApplyChanges,
        Command::ResetChanges => DisplayRequest::ResetChanges,
        Command::Save => DisplayRequest::Save,
        Command::DeleteCustom => DisplayRequest::DeleteCustomConfig,
        Command::Reset => DisplayRequest::Reset,
        Command::Scale { value: Some(value) } => {
            DisplayRequest::SetScaleFactors(with_global_scale(current_scale()?, *value))
        }
        Command::Scale { value: None } => DisplayRequest::GetScaleFactors,
        Command::State => DisplayRequest::GetState,
        Command::Ping => DisplayRequest::Ping,
    })
}

fn fetch_scale_factors(client: &mut DisplayClient) -> Result<ScaleFactors> {
    match client.request(DisplayRequest::GetScaleFactors)? {
        DisplayResponse::ScaleFactors(factors) => Ok(factors),
        DisplayResponse::Error(message) => Err(anyhow!(message)),
        other => bail!("Unexpected reply to GetScaleFactors: {:?}", other),
    }
}

fn run_client(cli: &Cli, command: &Command) -> Result<()> {
    let mut client = DisplayClient::connect_to(&socket_path(cli)?)?;
    let request = request_for(command, || fetch_scale_factors(&mut client))?;
    match client.request(request)? {
        DisplayResponse::OutputNames(names) => {
            for name in names {
                println!("{name}");
            }
        }
        DisplayResponse::ScaleFactors(factors) => {
            for (scope, value) in factors.iter() {
                println!("{scope}\t{value}");
            }
        }
        DisplayResponse::State { mode, primary, fingerprint, has_changed } => {
            let mode = DisplayMode::try_from(mode).map(|m| m.to_string()).unwrap_or_else(|_| mode.to_string());
            println!("mode\t{mode}");
            println!("primary\t{primary}");
            println!("outputs\t{fingerprint}");
            println!("pending\t{has_changed}");
        }
        DisplayResponse::Pong => println!("pong"),
        DisplayResponse::Ready => {}
        DisplayResponse::Error(message) => return Err(anyhow!(message)),
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    match &cli.command {
        None | Some(Command::Daemon { greeter: false }) => run_daemon(&cli, false),
        Some(Command::Daemon { greeter: true }) => run_daemon(&cli, true),
        Some(command) => run_client(&cli, command),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_switch_mode() {
        let cli = Cli::try_parse_from(["monitor-configd", "switch-mode", "only-one", "HDMI-1"]).unwrap();
        let request = request_for(cli.command.as_ref().unwrap(), no_scale).unwrap();
        assert_eq!(request, DisplayRequest::SwitchMode { mode: 3, name: "HDMI-1".to_string() });
    }

    fn no_scale() -> Result<ScaleFactors> {
        panic!("scale factors fetched for a request that does not need them")
    }

    #[test]
    fn test_cli_scale_get_and_set() {
        let get = Cli::try_parse_from(["monitor-configd", "scale"]).unwrap();
        assert_eq!(request_for(get.command.as_ref().unwrap(), no_scale).unwrap(), DisplayRequest::GetScaleFactors);

        let set = Cli::try_parse_from(["monitor-configd", "scale", "1.5"]).unwrap();
        let current: ScaleFactors = [("ALL".to_string(), 1.0), ("HDMI-1".to_string(), 2.0)].into_iter().collect();
        let request = request_for(set.command.as_ref().unwrap(), || Ok(current)).unwrap();

        let expected: ScaleFactors = [("ALL".to_string(), 1.5), ("HDMI-1".to_string(), 2.0)].into_iter().collect();
        assert_eq!(request, DisplayRequest::SetScaleFactors(expected));
    }

    #[test]
    fn test_daemon_is_not_a_client_request() {
        let cli = Cli::try_parse_from(["monitor-configd", "daemon"]).unwrap();
        assert!(request_for(cli.command.as_ref().unwrap(), no_scale).is_err());
    }

    #[test]
    fn test_cli_greeter_flag() {
        let cli = Cli::try_parse_from(["monitor-configd", "daemon", "--greeter"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Daemon { greeter: true })));
    }
}
