use std::net::SocketAddr;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use udp_bridge::cli::{Cli, Commands};
use udp_bridge::config::BridgeConfig;
use udp_bridge::emulator::UdpEmulator;
use udp_bridge::http::{router, AppState};
use udp_bridge::runtime::Bridge;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => serve(&config).await,
        Commands::Emulator { config } => emulate(&config).await,
    }
}

/// Run the HTTP bridge until interrupted.
async fn serve(config_path: &Path) -> Result<()> {
    let config = BridgeConfig::load_or_default(config_path)?;
    config.validate().context("invalid configuration")?;

    let bridge = Bridge::start(&config)
        .await
        .context("failed to start the bridge core")?;
    let state = AppState {
        coordinator: bridge.coordinator(),
        cache: bridge.cache(),
        request_timeout: config.http.request_timeout(),
        request_id_header: config.http.request_id_header.clone(),
    };

    let bind_addr: SocketAddr = config
        .http
        .bind_addr
        .parse()
        .with_context(|| format!("invalid HTTP bind address '{}'", config.http.bind_addr))?;
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {}", bind_addr))?;
    info!("HTTP server listening on {}", bind_addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    bridge.shutdown().await;
    Ok(())
}

/// Run the echo emulator until interrupted.
async fn emulate(config_path: &Path) -> Result<()> {
    let config = BridgeConfig::load_or_default(config_path)?;
    config.validate().context("invalid configuration")?;

    let emulator = UdpEmulator::bind(config.emulator.clone())
        .await
        .context("failed to bind the emulator socket")?;

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        trigger.cancel();
    });

    emulator.run(shutdown).await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {}", error);
    }
}
