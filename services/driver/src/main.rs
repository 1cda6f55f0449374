//! doks-driver
//!
//! Serves the DigitalOcean Kubernetes driver to the orchestration host on a
//! local port.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use doks_driver::{
    api, config,
    gateway::{DigitalOceanFactory, GatewayFactory, InMemoryGateway},
    shutdown::cancel_on_signal,
    state::AppState,
    Driver,
};
use doks_state::JsonStateBuilder;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "doks-driver", version, about)]
struct Args {
    /// Local port the host connects to.
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = config::Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to DOKS_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting doks-driver");
    info!(
        api_url = %config.api_url,
        poll_interval_secs = config.poll_interval.as_secs(),
        operation_timeout_secs = config.operation_timeout.as_secs(),
        "Configuration loaded"
    );

    let gateways: Arc<dyn GatewayFactory> = if config.dev_mode {
        warn!("Dev mode: serving against the in-memory provider");
        Arc::new(Arc::new(InMemoryGateway::new()).factory())
    } else {
        Arc::new(DigitalOceanFactory::new(&config))
    };

    let driver = Driver::new(Arc::new(JsonStateBuilder), gateways)
        .with_poll_interval(config.poll_interval);

    // Cancelled on shutdown; every request context is a child of it
    let shutdown = CancellationToken::new();
    let state = AppState::new(driver, shutdown.clone(), config.operation_timeout);

    let app = api::create_router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], args.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %addr, "Listening for connections");

    let server = axum::serve(listener, app).with_graceful_shutdown({
        let shutdown = shutdown.clone();
        async move {
            cancel_on_signal(tokio::signal::ctrl_c(), shutdown).await;
            info!("HTTP server shutting down");
        }
    });

    if let Err(e) = server.await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Driver shutdown complete");
    Ok(())
}
