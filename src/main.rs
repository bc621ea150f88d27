//! collab-gateway server entry point.
//!
//! Starts the Axum HTTP server with the WebSocket endpoint and system
//! routes.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use collab_gateway::api;
use collab_gateway::app_state::AppState;
use collab_gateway::auth::JwtValidator;
use collab_gateway::config::GatewayConfig;
use collab_gateway::domain::{EventBus, PresenceRegistry};
use collab_gateway::ws::RealtimeGateway;
use collab_gateway::ws::handler::ws_handler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = GatewayConfig::from_env()?;
    tracing::info!(addr = %config.listen_addr, "starting collab-gateway");

    // Build the gateway: registry and event bus live for the whole
    // process and are reachable only through this handle.
    let registry = Arc::new(PresenceRegistry::new());
    let event_bus = EventBus::new(config.event_bus_capacity);
    let validator = Arc::new(JwtValidator::new(&config.auth_jwt_secret));
    let gateway = Arc::new(RealtimeGateway::new(registry, event_bus, validator));

    let app_state = AppState { gateway };

    // Build router
    let app = Router::new()
        .merge(api::build_router())
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
