//! Axum WebSocket upgrade handler with handshake authentication.
//!
//! The bearer token is validated before the upgrade completes: an
//! unauthenticated client is refused with a 401 JSON error and never
//! reaches the registry. Browser clients pass the token as a `token`
//! query parameter (they cannot set headers on a WebSocket); native
//! clients use the `Authorization` header.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::response::IntoResponse;
use serde::Deserialize;

use super::connection::run_connection;
use crate::app_state::AppState;
use crate::error::GatewayError;

/// Query parameters accepted on the upgrade request.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Bearer access token, for clients that cannot set headers.
    pub token: Option<String>,
}

/// `GET /ws` — authenticate, then upgrade to a WebSocket connection.
///
/// # Errors
///
/// Returns [`GatewayError::NotAuthenticated`] (401) when the bearer token
/// is absent or rejected by the validator.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, GatewayError> {
    let token = bearer_token(&headers, &query)
        .ok_or_else(|| GatewayError::NotAuthenticated("missing bearer token".to_string()))?;

    let user_id = state.gateway.authenticate(&token).await?;
    let gateway = Arc::clone(&state.gateway);

    Ok(ws.on_upgrade(move |socket| run_connection(socket, user_id, gateway)))
}

/// Extracts the bearer token from the `Authorization` header, falling back
/// to the `token` query parameter.
fn bearer_token(headers: &HeaderMap, query: &WsQuery) -> Option<String> {
    if let Some(value) = headers.get(AUTHORIZATION)
        && let Ok(value) = value.to_str()
        && let Some(token) = value.strip_prefix("Bearer ")
    {
        return Some(token.to_string());
    }
    query.token.clone()
}
