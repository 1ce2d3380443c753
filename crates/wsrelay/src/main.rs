//! # wsrelay
//!
//! Relay binary: loads settings, applies CLI overrides, and runs the relay
//! until a shutdown signal or the upstream session ends.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use wsrelay_server::Relay;
use wsrelay_settings::RelaySettings;

/// HTTP to WebSocket JSON-RPC relay.
#[derive(Parser, Debug)]
#[command(name = "wsrelay", about = "Relay HTTP JSON-RPC callers over one upstream WebSocket")]
struct Cli {
    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on.
    #[arg(long)]
    port: Option<u16>,

    /// Seconds to wait for an upstream reply.
    #[arg(long)]
    timeout: Option<u64>,

    /// Upstream WebSocket endpoint (`ws://` or `wss://`).
    #[arg(long)]
    endpoint: Option<String>,

    /// Settings file (defaults to `~/.wsrelay/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level filter, e.g. `info` or `wsrelay_server=debug`.
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Apply flags on top of loaded settings. Flags win over every other layer.
    fn apply(&self, settings: &mut RelaySettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(secs) = self.timeout {
            settings.relay.request_timeout_ms = secs.saturating_mul(1000);
        }
        if let Some(endpoint) = &self.endpoint {
            settings.upstream.endpoint.clone_from(endpoint);
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings_path = cli
        .config
        .clone()
        .unwrap_or_else(wsrelay_settings::settings_path);
    let loaded = wsrelay_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("failed to load settings from {}", settings_path.display()))?;
    let mut settings = loaded.settings.clone();
    cli.apply(&mut settings);

    // Logging depends on the loaded level; report ignored env vars once it is up.
    wsrelay_core::logging::init_subscriber(&settings.logging.level);
    loaded.log_rejected();

    if let Err(e) = settings.validate() {
        Cli::command().error(ErrorKind::ValueValidation, e).exit();
    }

    tracing::info!(
        endpoint = %settings.upstream.endpoint,
        port = settings.server.port,
        timeout_ms = settings.relay.request_timeout_ms,
        "starting relay"
    );

    let metrics = wsrelay_server::metrics::install_recorder().context("metrics setup failed")?;
    Relay::new(settings)
        .with_metrics(metrics)
        .run()
        .await
        .context("relay stopped")
}
