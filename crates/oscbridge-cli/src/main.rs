//! oscbridge - OSC over UDP to WebSocket bridge
//!
//! Relays OSC control messages to browser clients as JSON and sends their
//! audio analysis events back out as OSC.

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use oscbridge_router::{Bridge, BridgeConfig};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod banner;

/// Time allowed on top of the bridge's own flush wait before exiting anyway
const SHUTDOWN_HEADROOM: Duration = Duration::from_secs(2);

/// Bridge OSC over UDP to WebSocket clients
#[derive(Parser, Debug)]
#[command(name = "oscbridge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// UDP port for inbound OSC
    #[arg(env = "OSCBRIDGE_OSC_PORT")]
    osc_port: Option<u16>,

    /// TCP port for the WebSocket server
    #[arg(env = "OSCBRIDGE_WS_PORT")]
    ws_port: Option<u16>,

    /// Configuration file path (TOML)
    #[arg(short, long, env = "OSCBRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Interface for inbound OSC
    #[arg(long, env = "OSCBRIDGE_OSC_BIND")]
    osc_bind: Option<String>,

    /// Interface for the WebSocket server
    #[arg(long, env = "OSCBRIDGE_WS_BIND")]
    ws_bind: Option<String>,

    /// Host that analysis events are sent to
    #[arg(long, env = "OSCBRIDGE_OUT_HOST")]
    out_host: Option<String>,

    /// Port that analysis events are sent to
    #[arg(long, env = "OSCBRIDGE_OUT_PORT")]
    out_port: Option<u16>,

    /// Seconds between liveness sweeps
    #[arg(long, env = "OSCBRIDGE_LIVENESS_INTERVAL")]
    liveness_interval: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Suppress the banner and log warnings only
    #[arg(short, long)]
    quiet: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,
}

impl Cli {
    /// Apply flags and positional ports over a loaded config
    fn apply(&self, config: &mut BridgeConfig) {
        if let Some(bind) = &self.osc_bind {
            config.osc.bind = bind.clone();
        }
        if let Some(bind) = &self.ws_bind {
            config.websocket.bind = bind.clone();
        }
        if let Some(host) = &self.out_host {
            config.outbound.host = host.clone();
        }
        if let Some(port) = self.out_port {
            config.outbound.port = port;
        }
        if let Some(secs) = self.liveness_interval {
            config.liveness_interval_secs = secs;
        }
        if let Some(port) = self.osc_port {
            config.osc.port = port;
        }
        if let Some(port) = self.ws_port {
            config.websocket.port = port;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli)?;

    if cli.print_config {
        print!("{}", toml::to_string_pretty(&config).context("Failed to render config")?);
        return Ok(());
    }

    let level = if cli.quiet { "warn" } else { cli.log_level.as_str() };
    setup_logging(level, cli.json_logs)?;

    let mut bridge = Bridge::start(config.clone())
        .await
        .context("Failed to start bridge")?;

    if !cli.quiet {
        banner::print(&bridge);
    }

    let outcome = tokio::select! {
        result = bridge.wait() => result.context("Bridge task failed"),
        signal = shutdown_signal() => {
            info!("Received {}", signal);
            Ok(())
        }
    };

    if !cli.quiet {
        println!("\n{}", "Shutting down...".yellow());
    }

    let deadline = hard_deadline(&config);
    match tokio::time::timeout(deadline, bridge.shutdown()).await {
        Ok(closed) => info!("Closed {} client connection(s)", closed),
        Err(_) => warn!("Shutdown did not finish within {:?}, exiting", deadline),
    }

    outcome
}

/// Outer bound on `Bridge::shutdown`, which itself waits up to the grace period
fn hard_deadline(config: &BridgeConfig) -> Duration {
    config.shutdown_timeout() + SHUTDOWN_HEADROOM
}

fn setup_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Failed to parse log level")?;

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).compact())
            .init();
    }

    Ok(())
}

/// Default config location, used when no `--config` is given and it exists
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("oscbridge").join("oscbridge.toml"))
        .filter(|path| path.is_file())
}

fn load_config(cli: &Cli) -> Result<BridgeConfig> {
    let path = cli.config.clone().or_else(default_config_path);

    let mut config = match path {
        Some(path) => read_config(&path)?,
        None => BridgeConfig::default(),
    };

    cli.apply(&mut config);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn read_config(path: &Path) -> Result<BridgeConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    parse_config(&text).with_context(|| format!("Invalid config file {}", path.display()))
}

fn parse_config(text: &str) -> Result<BridgeConfig> {
    Ok(toml::from_str(text)?)
}

/// Resolves with the name of the first shutdown signal received
async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "SIGINT",
            Err(e) => {
                warn!("Failed to listen for ctrl+c: {}", e);
                std::future::pending().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                "SIGTERM"
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<&'static str>();

    tokio::select! {
        name = ctrl_c => name,
        name = terminate => name,
    }
}
