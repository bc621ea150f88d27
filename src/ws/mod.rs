//! WebSocket layer: handshake, connection loop, message routing.
//!
//! The WebSocket endpoint at `/ws` authenticates each connection before
//! upgrade, then serves bidirectional project-room traffic: joins, leaves,
//! and relayed entity updates.

pub mod connection;
pub mod gateway;
pub mod handler;
pub mod messages;
pub mod subscription;

pub use gateway::RealtimeGateway;
