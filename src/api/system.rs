//! System endpoints: health check and live gateway status.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::app_state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    timestamp: String,
    version: String,
}

/// `GET /health` — Service health status.
pub async fn health_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// Live gateway status response.
#[derive(Debug, Serialize)]
struct StatusResponse {
    /// Live WebSocket connections.
    connections: usize,
    /// Non-empty project rooms.
    rooms: usize,
    timestamp: String,
}

/// `GET /status` — Live connection and room counts.
pub async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let registry = state.gateway.registry();
    (
        StatusCode::OK,
        Json(StatusResponse {
            connections: registry.connection_count().await,
            rooms: registry.room_count().await,
            timestamp: Utc::now().to_rfc3339(),
        }),
    )
}

/// System routes mounted at the root level.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
}
