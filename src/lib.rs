//! # collab-gateway
//!
//! Presence-aware realtime collaboration gateway and resilient
//! session-token client for a task/project management service.
//!
//! The server side terminates WebSocket connections, authenticates them
//! against the CRUD layer's tokens, and routes project-room traffic: who
//! joined, who left, which tasks changed. The client side keeps every
//! outbound request authenticated across access-token expiry with at most
//! one refresh in flight, and turns gateway events into per-project event
//! streams.
//!
//! ## Architecture
//!
//! ```text
//! Clients (WebSocket)          CRUD layer
//!     │                            │
//!     ├── WS Handler (ws/)         ├── TokenValidator (auth/)
//!     │                            └── EventBus::publish (domain/)
//!     ├── RealtimeGateway (ws/)
//!     ├── PresenceRegistry (domain/)
//!     │
//!     └── System routes (api/)
//!
//! Client process
//!     ├── TokenStore → SessionTokenManager (client/)
//!     └── RealtimeClient (client/)
//! ```

pub mod api;
pub mod app_state;
pub mod auth;
pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod ws;
