//! Per-connection event loop.
//!
//! A connection arriving here has already authenticated
//! (`Connecting → Authenticating` happens in the upgrade handler); this
//! module runs the `Active` state until the transport closes, then the
//! `Disconnected` transition: deregister and notify every vacated room.
//!
//! Three sources feed the loop: the socket itself (client commands), the
//! connection's own room channel (events relayed by other members), and
//! the CRUD event bus (entity changes published by the resource API).
//! All outbound traffic flows through one sink, so a connection observes
//! events in arrival order.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};

use super::gateway::RealtimeGateway;
use super::messages::ClientMessage;
use super::subscription::ProjectFilter;
use crate::domain::{ConnectionId, RealtimeEvent, UserId};
use crate::error::GatewayError;

/// Runs the read/write loop for one authenticated WebSocket connection.
pub async fn run_connection(socket: WebSocket, user_id: UserId, gateway: Arc<RealtimeGateway>) {
    let connection_id = ConnectionId::new();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();

    if let Err(e) = gateway
        .registry()
        .register(connection_id, user_id, event_tx)
        .await
    {
        tracing::error!(%connection_id, error = %e, "connection registration failed");
        return;
    }
    tracing::debug!(%connection_id, %user_id, "ws connection active");

    let mut bus_rx = gateway.event_bus().subscribe();
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut filter = ProjectFilter::new();

    loop {
        tokio::select! {
            // Incoming message from the client
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let handled = handle_client_message(
                            &text,
                            connection_id,
                            user_id,
                            &gateway,
                            &mut filter,
                        )
                        .await;
                        if let Err(e) = handled {
                            tracing::error!(%connection_id, error = %e, "closing connection");
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
            // Event relayed from another member of one of our rooms
            event = event_rx.recv() => {
                match event {
                    Some(event) => {
                        if send_event(&mut ws_tx, &event).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            // Entity change from the CRUD layer
            event = bus_rx.recv() => {
                match event {
                    Ok(event) => {
                        if filter.matches(event.project_id())
                            && send_event(&mut ws_tx, &event).await.is_err() {
                                break;
                            }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(%connection_id, lagged = n, "ws client lagged behind event bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    // Disconnected transition: every close path (client close frame,
    // transport error, idle timeout) runs the same teardown.
    let vacated = gateway.registry().deregister(connection_id).await;
    for room in vacated {
        let event = RealtimeEvent::UserLeft {
            user_id,
            project_id: room.project_id,
        };
        gateway.deliver(&room.peers, &event);
    }
    tracing::debug!(%connection_id, "ws connection closed");
}

/// Dispatches one inbound text frame.
///
/// Malformed payloads are dropped with a logged warning and the connection
/// stays open. Registry failures are returned and close this connection.
async fn handle_client_message(
    text: &str,
    connection_id: ConnectionId,
    user_id: UserId,
    gateway: &RealtimeGateway,
    filter: &mut ProjectFilter,
) -> Result<(), GatewayError> {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!(%connection_id, error = %e, "dropping malformed client message");
            return Ok(());
        }
    };

    match message {
        ClientMessage::JoinProject { project_id } => {
            let outcome = gateway
                .registry()
                .subscribe(connection_id, &project_id)
                .await?;
            filter.subscribe(&project_id);
            // Duplicate joins change nothing and notify no one.
            if outcome.newly_added {
                let event = RealtimeEvent::UserJoined {
                    user_id,
                    project_id,
                };
                gateway.deliver(&outcome.peers, &event);
            }
        }
        ClientMessage::LeaveProject { project_id } => {
            let outcome = gateway
                .registry()
                .unsubscribe(connection_id, &project_id)
                .await?;
            filter.unsubscribe(&project_id);
            if outcome.removed {
                let event = RealtimeEvent::UserLeft {
                    user_id,
                    project_id,
                };
                gateway.deliver(&outcome.peers, &event);
            }
        }
        ClientMessage::TaskUpdate { project_id, entity } => {
            let peers = gateway
                .registry()
                .peers_of(&project_id, Some(connection_id))
                .await;
            let event = RealtimeEvent::TaskUpdated { project_id, entity };
            gateway.deliver(&peers, &event);
        }
        ClientMessage::ProjectUpdate { project_id, entity } => {
            let peers = gateway
                .registry()
                .peers_of(&project_id, Some(connection_id))
                .await;
            let event = RealtimeEvent::ProjectUpdated { project_id, entity };
            gateway.deliver(&peers, &event);
        }
    }
    Ok(())
}

/// Serializes an event and writes it to the socket.
///
/// A serialization failure only skips the event; a transport failure is
/// returned so the caller tears the connection down.
async fn send_event(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    event: &RealtimeEvent,
) -> Result<(), axum::Error> {
    match serde_json::to_string(event) {
        Ok(json) => ws_tx.send(Message::text(json)).await,
        Err(e) => {
            tracing::warn!(error = %e, kind = event.kind_str(), "failed to serialize event");
            Ok(())
        }
    }
}
