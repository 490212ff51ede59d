//! Axum HTTP handlers for the dashboard API.
//!
//! Serves the state of the running status watch:
//! - `GET /health` - Liveness and current watch state
//! - `GET /api/status` - Latest status update, or `503` with the stale state
//!
//! CORS is open to any origin so a dashboard served elsewhere can read it.

use axum::{
    Json, Router,
    extract::State,
    http::{Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use statuswatch::WatchState;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};

/// Shared application state for axum handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Observed watch state.
    pub board: watch::Receiver<WatchState>,
    /// The watched endpoint.
    pub endpoint: String,
}

/// Health status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Whether this process is serving.
    pub healthy: bool,
    /// The watched endpoint.
    pub endpoint: String,
    /// Name of the current watch state.
    pub state: String,
}

/// Creates the axum router with all dashboard endpoints.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers([header::ORIGIN])
        .expose_headers([header::CONTENT_LENGTH]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/status", get(status_handler))
        .layer(cors)
        .with_state(state)
}

/// Handler for `GET /health`.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let name = state.board.borrow().name();
    Json(HealthStatus { healthy: true, endpoint: state.endpoint.clone(), state: name.to_string() })
}

/// Handler for `GET /api/status`.
async fn status_handler(State(state): State<AppState>) -> Response {
    let current = state.board.borrow().clone();
    match current {
        WatchState::Live(update) => (StatusCode::OK, Json(update)).into_response(),
        other => (StatusCode::SERVICE_UNAVAILABLE, Json(other.summary())).into_response(),
    }
}
