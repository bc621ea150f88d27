//! Realtime gateway: the owner of the presence registry and event bus.
//!
//! Constructed once at server start and torn down at shutdown; every
//! WebSocket connection and the CRUD layer reach the registry only through
//! this handle, never as ambient global state.

use std::sync::Arc;

use crate::auth::TokenValidator;
use crate::domain::{EventBus, Peer, PresenceRegistry, RealtimeEvent, UserId};
use crate::error::GatewayError;

/// Coordination point for all realtime traffic.
///
/// Owns the [`PresenceRegistry`] and the [`EventBus`] and holds the
/// CRUD layer's [`TokenValidator`]. The CRUD layer broadcasts entity
/// changes through [`RealtimeGateway::publish`]; connections subscribe and
/// relay through the registry.
#[derive(Debug, Clone)]
pub struct RealtimeGateway {
    registry: Arc<PresenceRegistry>,
    event_bus: EventBus,
    validator: Arc<dyn TokenValidator>,
}

impl RealtimeGateway {
    /// Creates a new gateway.
    #[must_use]
    pub fn new(
        registry: Arc<PresenceRegistry>,
        event_bus: EventBus,
        validator: Arc<dyn TokenValidator>,
    ) -> Self {
        Self {
            registry,
            event_bus,
            validator,
        }
    }

    /// Returns a reference to the inner [`PresenceRegistry`].
    #[must_use]
    pub fn registry(&self) -> &Arc<PresenceRegistry> {
        &self.registry
    }

    /// Returns a reference to the inner [`EventBus`].
    #[must_use]
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Validates a handshake bearer token.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::NotAuthenticated`] for a missing, expired,
    /// or invalid token.
    pub async fn authenticate(&self, token: &str) -> Result<UserId, GatewayError> {
        self.validator.validate(token).await
    }

    /// Broadcast call exposed to the CRUD layer: publishes an entity
    /// change to every connection subscribed to its project.
    ///
    /// Returns the number of connection tasks that received the event.
    pub fn publish(&self, event: RealtimeEvent) -> usize {
        let count = self.event_bus.publish(event);
        tracing::trace!(receivers = count, "published entity change");
        count
    }

    /// Pushes an event to each peer's outbound channel.
    ///
    /// A send failure means the peer's connection task already exited; the
    /// peer is skipped, its own disconnect path handles cleanup. Returns
    /// the number of peers reached.
    pub fn deliver(&self, peers: &[Peer], event: &RealtimeEvent) -> usize {
        let mut delivered = 0;
        for peer in peers {
            if peer.sender.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }
}
