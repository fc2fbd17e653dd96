//! # chatgate-gateway
//!
//! Gateway binary: loads settings, starts logging and metrics, wires the
//! in-memory backend into the WebSocket server and serves until `ctrl_c`.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use chatgate_server::config::ServerConfig;
use chatgate_server::metrics::install_recorder;
use chatgate_server::server::GatewayServer;
use chatgate_server::services::Services;
use chatgate_settings::GatewaySettings;
use clap::Parser;

/// Real-time messaging gateway.
#[derive(Parser, Debug)]
#[command(name = "chatgate-gateway", about = "Real-time messaging gateway")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (defaults to `~/.chatgate/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log filter directive when `RUST_LOG` is unset (overrides settings).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Defaults, then file, then env, then these flags.
    fn resolve_settings(&self) -> Result<GatewaySettings> {
        let path = self
            .settings
            .clone()
            .unwrap_or_else(chatgate_settings::settings_path);
        let mut settings = chatgate_settings::load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;

        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = args.resolve_settings()?;

    chatgate_core::logging::init_subscriber(&settings.logging.level, settings.logging.json);
    let metrics = install_recorder();

    let config = ServerConfig::from(&settings);
    let (services, _backend) = Services::in_memory();
    let server = GatewayServer::new(config, &services).with_metrics(metrics);

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!(
        %addr,
        ordering = ?server.config().ordering,
        max_connections = server.config().max_connections,
        "chatgate gateway listening"
    );

    server.shutdown().wait_for_signal().await;
    tracing::info!("Shutting down...");
    server.shutdown().graceful_shutdown(vec![handle], None).await;

    tracing::info!("Shutdown complete");
    Ok(())
}
