// =============================================================================
// Portfolio Analysis Backend — Main Entry Point
// =============================================================================
//
// Loads configuration, connects to the document store, builds the shared
// state, mounts the WebSocket and REST routers, and serves. All process-wide
// side effects live in `bootstrap::init` — this function only sequences
// them.
// =============================================================================

mod analysis;
mod api;
mod bootstrap;
mod config;
mod error;
mod market;
mod portfolio;
mod rng;
mod session;
mod state;
mod store;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("portfolio analysis backend starting up");

    let config = Config::from_env();
    let bind_addr = config.bind_addr.clone();

    let state = match bootstrap::init(config).await {
        Ok(state) => state,
        Err(e) => {
            error!(error = %e, "fatal startup failure, exiting");
            std::process::exit(1);
        }
    };

    let ws_router = axum::Router::new()
        .route("/ws/:session_id", axum::routing::get(api::ws::ws_handler))
        .with_state(state.clone());
    let app = ws_router.merge(api::rest::router(state));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    warn!("portfolio analysis backend shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to install Ctrl+C handler");
        return;
    }
    warn!("shutdown signal received — draining connections");
}
