//! Zonecast Server - HTTP control surface for a multi-zone renderer fleet.
//!
//! This binary wires the zonecast-core engine to the in-memory virtual fleet
//! and serves the action API until it receives a shutdown signal.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use zonecast_core::{bootstrap_services, start_server, ServerLifecycle, VirtualFleet};

use crate::config::ServerConfig;

/// Zonecast Server - Action dispatch and long-polling API for media renderers.
#[derive(Parser, Debug)]
#[command(name = "zonecast-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "ZONECAST_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long, env = "ZONECAST_BIND_PORT")]
    port: Option<u16>,

    /// Fleet description file (overrides config file).
    #[arg(short = 'f', long, value_name = "FILE", env = "ZONECAST_FLEET")]
    fleet: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Zonecast Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(fleet) = args.fleet {
        config.fleet = Some(fleet);
    }

    log::info!(
        "Configuration: bind_port={}, poll_interval={}ms, \
         execution_timeout={}ms, settle_delay={}ms",
        config.bind_port,
        config.poll_interval_ms,
        config.execution_timeout_ms,
        config.settle_delay_ms
    );

    let fleet_spec = config.load_fleet()?;
    let fleet = VirtualFleet::new(fleet_spec, config.settle_delay())
        .context("Invalid fleet description")?;

    let services = bootstrap_services(
        config.to_core_config(),
        Arc::new(fleet),
        Arc::new(ServerLifecycle),
    )
    .context("Failed to bootstrap services")?;

    log::info!("Services bootstrapped successfully");

    let app_state = services.app_state();
    let server_shutdown = services.cancel_token.child_token();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(app_state, server_shutdown).await {
            log::error!("Server error: {}", e);
        }
    });

    // Wait for shutdown signal
    shutdown_signal().await;

    log::info!("Shutdown signal received, cleaning up...");

    // Graceful shutdown (cancels the server token as well)
    services.shutdown().await;

    if let Err(e) = server_handle.await {
        log::warn!("Server task ended abnormally: {}", e);
    }

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
