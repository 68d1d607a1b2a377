//! # hubbub
//!
//! Broadcast hub binary: loads settings, sets up logging and metrics, and
//! serves `/ws` until ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use hubbub_logging::LogFormat;
use hubbub_server::config::ServerConfig;
use hubbub_server::server::HubServer;
use hubbub_settings::{HubbubSettings, Mode};

/// Real-time WebSocket broadcast hub.
#[derive(Parser, Debug)]
#[command(name = "hubbub", about = "Real-time WebSocket broadcast hub")]
struct Cli {
    /// Address to listen on, `host:port` (overrides settings).
    #[arg(long)]
    addr: Option<String>,

    /// Deployment mode: `dev` or `prod` (overrides settings).
    #[arg(long)]
    mode: Option<Mode>,

    /// Settings file (default: `$HUBBUB_CONFIG` or `~/.hubbub/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    /// Apply command-line overrides, the last settings layer.
    fn apply(&self, settings: &mut HubbubSettings) {
        if let Some(addr) = &self.addr {
            settings.server.addr.clone_from(addr);
        }
        if let Some(mode) = self.mode {
            settings.server.mode = mode;
        }
    }
}

fn resolve_settings(cli: &Cli) -> Result<HubbubSettings> {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(hubbub_settings::settings_path);
    let mut settings = hubbub_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);
    settings.validate().context("Invalid settings")?;
    Ok(settings)
}

fn log_format(mode: Mode) -> LogFormat {
    match mode {
        Mode::Dev => LogFormat::Compact,
        Mode::Prod => LogFormat::Json,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = resolve_settings(&cli)?;

    let _ = hubbub_logging::init_subscriber(
        settings.logging.level.as_filter_str(),
        log_format(settings.server.mode),
    );

    let metrics = match hubbub_server::metrics::install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "metrics recorder unavailable, /metrics disabled");
            None
        }
    };

    let server = HubServer::new(ServerConfig::from(&settings), metrics);
    let (addr, mut serving) = server
        .listen()
        .await
        .context("Failed to start listener")?;

    tracing::info!(mode = %settings.server.mode, "hubbub ready on ws://{addr}/ws");

    let listener_stopped = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for ctrl-c")?;
            false
        }
        _ = &mut serving => true,
    };

    tracing::info!("Shutting down...");
    if !server.shutdown_gracefully().await {
        tracing::warn!("sessions still draining at shutdown timeout");
    }
    if listener_stopped {
        anyhow::bail!("listener stopped unexpectedly");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
