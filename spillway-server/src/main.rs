//! Spillway - transparent failover gateway daemon.
//!
//! Loads the YAML config named by `CONFIG_PATH`, then serves:
//! - `ANY /{path...}` - the transparent proxy catch-all
//! - `GET /_health` - provider list and circuit breaker snapshots
//! - `POST /_reset_circuit` - hard-reset every breaker

use anyhow::Result;
use axum::routing::{get, post};
use axum::Router;
use tracing::info;

use spillway_core::{build_proxy_router, GatewayState};

mod api;

const DEFAULT_ADDR: &str = "127.0.0.1:8080";

#[tokio::main]
async fn main() -> Result<()> {
    spillway_core::logging::init_logging();

    let config = spillway_core::load_config()?;
    info!(
        providers = config.providers.len(),
        auth_enabled = !config.gateway.access_token.is_empty(),
        "configuration loaded"
    );

    let state = GatewayState::new(config)?;

    let app = Router::new()
        .route("/_health", get(api::health))
        .route("/_reset_circuit", post(api::reset_circuit))
        .with_state(state.clone())
        .merge(build_proxy_router(state));

    let addr = std::env::var("GATEWAY_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %listener.local_addr()?, "gateway listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to install Ctrl+C handler");
        return;
    }
    info!("shutdown signal received");
}
