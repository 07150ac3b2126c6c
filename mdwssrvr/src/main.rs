//! # mdwssrvr - WebSocket Tool Server
//!
//! Launcher for the capability-gated tool server. Realizes the `config/`
//! and `config/log/` directories next to the executable, loads (or
//! re-creates) the JSON configuration, registers the standard tools, wires
//! the rotating log sink into the server facade and drives the pump loop. The server core itself exposes no CLI; the flags
//! here belong to this launcher.

use anyhow::{Context, Result};
use clap::Parser;
use mdws_policy::Config;
use mdwssrvr::{logsink::LogSink, tools, McpServer};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const PUMP_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Parser)]
#[command(name = "mdwssrvr")]
#[command(about = "Capability-gated WebSocket tool server")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Path to the JSON configuration file (default: <install>/config/config.json)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level for diagnostic output (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Override the configured server port
    #[arg(long)]
    port: Option<u16>,

    /// Override the configured bind address and listen on all interfaces
    #[arg(long)]
    bind_all: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    info!("Starting mdwssrvr v{}", env!("CARGO_PKG_VERSION"));

    let install_dir = install_dir();
    let config_dir = install_dir.join("config");
    let log_dir = config_dir.join("log");
    let config_path = cli
        .config
        .unwrap_or_else(|| config_dir.join("config.json"));

    let (mut config, status) = Config::load(&config_path);
    if !status.is_ok() {
        warn!(
            "configuration missing or invalid ({}); resetting to defaults",
            config_path.display()
        );
        if let Err(e) = config.save(&config_path) {
            warn!("failed to save default configuration: {e}");
        }
    }
    if let Some(port) = cli.port {
        config.server_port = port;
        config.validate();
    }
    if cli.bind_all {
        config.bind_all_interfaces = true;
    }

    let sink = Arc::new(
        LogSink::new(&log_dir, config.max_log_size_mb)
            .with_context(|| format!("failed to prepare log directory {}", log_dir.display()))?,
    );
    info!("Interaction log: {}", sink.path().display());

    let mut server = McpServer::new(config.server_port, &config.ws_path_prefix);
    {
        let sink = sink.clone();
        server.set_log_callback(move |message| {
            info!("{message}");
            sink.log(message);
        });
    }

    tools::register_standard_tools(&mut server);
    server.apply_config(&config);
    server.start()?;

    while server.is_listening() {
        server.pump_events();
        std::thread::sleep(PUMP_INTERVAL);
    }
    Ok(())
}

/// Directory the executable lives in, falling back to the working
/// directory.
fn install_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("mdwssrvr={level}")));

    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();

    Ok(())
}
