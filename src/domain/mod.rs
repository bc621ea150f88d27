//! Domain layer: identifiers, presence registry, and event system.
//!
//! This module contains the server-side domain model: connection, user,
//! and project identity, the realtime event type, the event bus the CRUD
//! layer publishes into, and the presence registry tracking who is
//! connected and which projects each connection watches.

pub mod event;
pub mod event_bus;
pub mod ids;
pub mod registry;

pub use event::RealtimeEvent;
pub use event_bus::EventBus;
pub use ids::{ConnectionId, ProjectId, UserId};
pub use registry::{EventSender, Peer, PresenceRegistry};
