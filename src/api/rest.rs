// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// A single liveness/readiness endpoint. Everything else in this system is
// the WebSocket session protocol; REST exists only so load balancers and
// orchestrators have something to poll.
// =============================================================================

use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/healthz", get(healthz))
        .layer(cors)
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    active_sessions: usize,
    server_time: String,
}

async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        active_sessions: state.registry.len(),
        server_time: chrono::Utc::now().to_rfc3339(),
    })
}
