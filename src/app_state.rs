//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::ws::RealtimeGateway;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The realtime gateway owning the presence registry and event bus.
    pub gateway: Arc<RealtimeGateway>,
}
