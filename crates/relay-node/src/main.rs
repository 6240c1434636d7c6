//! Relay Node - WebSocket event hub server.

use anyhow::Context;
use clap::Parser;
use relay_node::api::{create_router, AppState};
use relay_node::config::Config;
use relay_node::observability::{init_logging, LogFormat};
use std::net::SocketAddr;
use std::path::PathBuf;
use validator::Validate;

/// Relay Node - named-event WebSocket hub
#[derive(Parser, Debug)]
#[command(name = "relay-node")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// API listen address
    #[arg(long)]
    api_addr: Option<SocketAddr>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log format (pretty, json)
    #[arg(long)]
    log_format: Option<String>,
}

impl Args {
    fn apply(self, config: &mut Config) {
        if let Some(addr) = self.api_addr {
            config.api_addr = addr;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args = Args::parse();

    let mut config =
        Config::load(args.config.take().as_deref()).context("failed to load configuration")?;
    args.apply(&mut config);
    config.validate().context("invalid configuration")?;

    init_logging(&config.log_level, LogFormat::parse(&config.log_format));

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting relay node");
    tracing::info!(
        api_addr = %config.api_addr,
        max_connections = config.max_connections,
        send_timeout_ms = config.send_timeout_ms,
        malformed_policy = ?config.malformed_policy,
        "Node configuration"
    );

    let state = AppState::new(&config);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(config.api_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.api_addr))?;
    tracing::info!(addr = %config.api_addr, "Node is ready. Press Ctrl+C to stop.");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Relay node stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
