//! # linkpush
//!
//! Server binary: loads settings, initializes logging and metrics, and
//! starts the HTTP/WebSocket server.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use linkpush_logging::{LogFormat, LogLevel};
use linkpush_server::config::ServerConfig;
use linkpush_server::server::LinkServer;
use linkpush_settings::LinkpushSettings;

/// URL shortener with WebSocket push delivery.
#[derive(Parser, Debug)]
#[command(name = "linkpush", about = "URL shortener with WebSocket push delivery")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (defaults to `~/.linkpush/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,
}

impl Cli {
    fn settings_path(&self) -> PathBuf {
        self.settings
            .clone()
            .unwrap_or_else(linkpush_settings::settings_path)
    }

    /// Server config from settings, with flags applied on top.
    fn server_config(&self, settings: &LinkpushSettings) -> ServerConfig {
        let mut config = ServerConfig::from_settings(settings);
        if let Some(host) = &self.host {
            config.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    // Settings first: the log level comes from them.
    let settings_path = args.settings_path();
    let settings = linkpush_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;

    linkpush_logging::init_subscriber(
        LogLevel::from_str_lossy(&settings.logging.level),
        LogFormat::from_str_lossy(&settings.logging.format),
    );

    let config = args.server_config(&settings);
    let mut server = LinkServer::new(config);
    match linkpush_server::metrics::install_recorder() {
        Ok(handle) => server = server.with_metrics(handle),
        Err(e) => tracing::warn!(error = %e, "metrics recorder unavailable, /metrics disabled"),
    }

    let (addr, _handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!("linkpush listening on http://{addr}");

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    if !server.shutdown().drain(None).await {
        tracing::warn!("some tasks did not stop in time");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
