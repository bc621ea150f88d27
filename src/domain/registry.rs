//! In-memory presence registry: who is connected, watching what.
//!
//! [`PresenceRegistry`] is the authoritative, process-local record of every
//! live connection, the user it authenticated as, the projects it
//! subscribes to, and the reverse index from project to member
//! connections. Single-process scope: nothing here is persisted or shared
//! across nodes.

use std::collections::{HashMap, HashSet};

use tokio::sync::{RwLock, mpsc};

use super::{ConnectionId, ProjectId, RealtimeEvent, UserId};
use crate::error::GatewayError;

/// Outbound half of a connection's event channel.
///
/// Room broadcasts are pushed here and drained by the connection's write
/// loop, which keeps per-connection delivery order equal to arrival order.
pub type EventSender = mpsc::UnboundedSender<RealtimeEvent>;

/// A member connection targeted by a room broadcast.
#[derive(Debug, Clone)]
pub struct Peer {
    /// The member's connection ID.
    pub connection_id: ConnectionId,
    /// Sender for the member's outbound event channel.
    pub sender: EventSender,
}

/// Result of a [`PresenceRegistry::subscribe`] call.
#[derive(Debug)]
pub struct SubscribeOutcome {
    /// `true` if the connection was not already a member of the room.
    /// Duplicate joins change nothing and notify no one.
    pub newly_added: bool,
    /// The other members of the room, snapshotted in the same critical
    /// section as the mutation.
    pub peers: Vec<Peer>,
}

/// Result of a [`PresenceRegistry::unsubscribe`] call.
#[derive(Debug)]
pub struct UnsubscribeOutcome {
    /// `true` if the connection was a member before the call.
    pub removed: bool,
    /// The members remaining in the room after removal.
    pub peers: Vec<Peer>,
}

/// One room a deregistered connection used to belong to, with the members
/// left behind.
#[derive(Debug)]
pub struct VacatedRoom {
    /// The project the connection was subscribed to.
    pub project_id: ProjectId,
    /// The members remaining in that room.
    pub peers: Vec<Peer>,
}

/// Per-connection bookkeeping.
#[derive(Debug)]
struct ConnectionEntry {
    user_id: UserId,
    subscriptions: HashSet<ProjectId>,
    sender: EventSender,
}

/// Both indices behind one lock.
#[derive(Debug, Default)]
struct RegistryInner {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    rooms: HashMap<ProjectId, HashSet<ConnectionId>>,
}

impl RegistryInner {
    /// Snapshots the senders of a room's members, minus `except`.
    fn room_peers(&self, project_id: &ProjectId, except: Option<ConnectionId>) -> Vec<Peer> {
        let Some(members) = self.rooms.get(project_id) else {
            return Vec::new();
        };
        members
            .iter()
            .filter(|id| Some(**id) != except)
            .filter_map(|id| {
                self.connections.get(id).map(|entry| Peer {
                    connection_id: *id,
                    sender: entry.sender.clone(),
                })
            })
            .collect()
    }
}

/// Central registry for all live WebSocket connections.
///
/// A single `RwLock` protects both the connection map and the project
/// reverse index, so every connection action and its broadcast enumeration
/// execute as one critical section: a concurrent deregister can never
/// observe (or be observed by) a half-applied mutation.
#[derive(Debug)]
pub struct PresenceRegistry {
    inner: RwLock<RegistryInner>,
}

impl PresenceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    /// Registers a freshly authenticated connection with no subscriptions.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] if the connection ID is already
    /// registered (should never happen with UUID v4).
    pub async fn register(
        &self,
        connection_id: ConnectionId,
        user_id: UserId,
        sender: EventSender,
    ) -> Result<(), GatewayError> {
        let mut inner = self.inner.write().await;
        if inner.connections.contains_key(&connection_id) {
            return Err(GatewayError::Internal(format!(
                "connection {connection_id} already registered"
            )));
        }
        inner.connections.insert(
            connection_id,
            ConnectionEntry {
                user_id,
                subscriptions: HashSet::new(),
                sender,
            },
        );
        Ok(())
    }

    /// Adds a connection to a project room. Idempotent.
    ///
    /// Returns whether the membership is new, plus the other members'
    /// senders so the caller can emit `user:joined` — both determined
    /// under the same write guard.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] if the connection is not
    /// registered.
    pub async fn subscribe(
        &self,
        connection_id: ConnectionId,
        project_id: &ProjectId,
    ) -> Result<SubscribeOutcome, GatewayError> {
        let mut inner = self.inner.write().await;
        let entry = inner.connections.get_mut(&connection_id).ok_or_else(|| {
            GatewayError::Internal(format!("connection {connection_id} not registered"))
        })?;
        let newly_added = entry.subscriptions.insert(project_id.clone());
        inner
            .rooms
            .entry(project_id.clone())
            .or_default()
            .insert(connection_id);

        let peers = inner.room_peers(project_id, Some(connection_id));
        Ok(SubscribeOutcome { newly_added, peers })
    }

    /// Removes a connection from a project room. Idempotent; calling it
    /// for a room the connection never joined is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] if the connection is not
    /// registered.
    pub async fn unsubscribe(
        &self,
        connection_id: ConnectionId,
        project_id: &ProjectId,
    ) -> Result<UnsubscribeOutcome, GatewayError> {
        let mut inner = self.inner.write().await;
        let entry = inner.connections.get_mut(&connection_id).ok_or_else(|| {
            GatewayError::Internal(format!("connection {connection_id} not registered"))
        })?;
        let removed = entry.subscriptions.remove(project_id);

        if let Some(members) = inner.rooms.get_mut(project_id) {
            members.remove(&connection_id);
            if members.is_empty() {
                inner.rooms.remove(project_id);
            }
        }

        let peers = inner.room_peers(project_id, Some(connection_id));
        Ok(UnsubscribeOutcome { removed, peers })
    }

    /// Removes all trace of a connection.
    ///
    /// Returns one [`VacatedRoom`] per project the connection was
    /// subscribed to, each carrying the members left behind, so the caller
    /// can emit `user:left` to every room. Calling this for an unknown
    /// connection returns an empty list (safe on an already-deregistered
    /// connection).
    pub async fn deregister(&self, connection_id: ConnectionId) -> Vec<VacatedRoom> {
        let mut inner = self.inner.write().await;
        let Some(entry) = inner.connections.remove(&connection_id) else {
            return Vec::new();
        };

        let mut vacated = Vec::with_capacity(entry.subscriptions.len());
        for project_id in entry.subscriptions {
            if let Some(members) = inner.rooms.get_mut(&project_id) {
                members.remove(&connection_id);
                if members.is_empty() {
                    inner.rooms.remove(&project_id);
                }
            }
            let peers = inner.room_peers(&project_id, Some(connection_id));
            vacated.push(VacatedRoom { project_id, peers });
        }
        vacated
    }

    /// Returns the connection IDs currently subscribed to a project,
    /// excluding `except` if given.
    pub async fn members_of(
        &self,
        project_id: &ProjectId,
        except: Option<ConnectionId>,
    ) -> Vec<ConnectionId> {
        let inner = self.inner.read().await;
        let Some(members) = inner.rooms.get(project_id) else {
            return Vec::new();
        };
        members
            .iter()
            .filter(|id| Some(**id) != except)
            .copied()
            .collect()
    }

    /// Snapshots the senders of a room's members, excluding `except` if
    /// given. Used to relay entity updates without mutating membership.
    pub async fn peers_of(
        &self,
        project_id: &ProjectId,
        except: Option<ConnectionId>,
    ) -> Vec<Peer> {
        let inner = self.inner.read().await;
        inner.room_peers(project_id, except)
    }

    /// Returns the user a connection authenticated as, if it is live.
    pub async fn user_of(&self, connection_id: ConnectionId) -> Option<UserId> {
        let inner = self.inner.read().await;
        inner.connections.get(&connection_id).map(|e| e.user_id)
    }

    /// Returns the number of live connections.
    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.connections.len()
    }

    /// Returns the number of non-empty project rooms.
    pub async fn room_count(&self) -> usize {
        self.inner.read().await.rooms.len()
    }
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
