//! HTTP surface beside the WebSocket endpoint.
//!
//! The CRUD resource API lives in its own service; this gateway only
//! exposes operational endpoints.

pub mod system;

use axum::Router;

use crate::app_state::AppState;

/// Builds the HTTP router with all non-WebSocket endpoints.
pub fn build_router() -> Router<AppState> {
    system::routes()
}
