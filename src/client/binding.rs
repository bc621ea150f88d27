//! Realtime binding: project subscriptions over the gateway socket.
//!
//! [`RealtimeClient`] owns one WebSocket to the gateway, shared by every
//! joined project. The connection is made lazily on the first join, using
//! the current access token; a 401-rejected handshake goes through the
//! session token manager's single-flight refresh and retries once. Events
//! arriving on the socket are routed to per-project channels.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::token_manager::SessionTokenManager;
use crate::domain::{ProjectId, RealtimeEvent};
use crate::error::SessionError;
use crate::ws::messages::ClientMessage;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type EventRoutes = Arc<Mutex<HashMap<ProjectId, mpsc::UnboundedSender<RealtimeEvent>>>>;

/// Outcome of one connect attempt, before refresh handling.
enum ConnectError {
    /// The server refused the handshake with 401.
    Unauthorized,
    /// Anything else connection-level.
    Transport(String),
}

/// The socket half of the client state.
#[derive(Debug, Default)]
struct ConnState {
    sink: Option<SplitSink<WsStream, Message>>,
    reader: Option<JoinHandle<()>>,
}

/// Client-side binding from gateway events to application state.
///
/// One instance per UI process; clones of the receivers it hands out feed
/// whatever state management the application uses.
#[derive(Debug)]
pub struct RealtimeClient {
    tokens: SessionTokenManager,
    gateway_url: String,
    state: Mutex<ConnState>,
    routes: EventRoutes,
}

impl RealtimeClient {
    /// Creates a binding that will connect to `gateway_url`
    /// (e.g. `ws://host:3000/ws`) on the first join.
    #[must_use]
    pub fn new(tokens: SessionTokenManager, gateway_url: impl Into<String>) -> Self {
        Self {
            tokens,
            gateway_url: gateway_url.into(),
            state: Mutex::new(ConnState::default()),
            routes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Joins a project room and returns the stream of its events.
    ///
    /// Connects lazily. Every `task:updated` / `project:updated` /
    /// `user:joined` / `user:left` event for the project flows into the
    /// returned receiver until [`RealtimeClient::leave_project`] is called
    /// or the connection drops.
    ///
    /// # Errors
    ///
    /// - [`SessionError::SessionTerminated`] if there is no active session
    ///   or the handshake refresh failed.
    /// - [`SessionError::AuthExpired`] if the handshake was rejected even
    ///   with a freshly refreshed token.
    /// - [`SessionError::Transport`] for connection-level failures.
    pub async fn join_project(
        &self,
        project_id: ProjectId,
    ) -> Result<mpsc::UnboundedReceiver<RealtimeEvent>, SessionError> {
        let (tx, rx) = mpsc::unbounded_channel();
        // Route first, then join: no event between the two can be missed.
        self.routes.lock().await.insert(project_id.clone(), tx);

        let result = self
            .send(ClientMessage::JoinProject {
                project_id: project_id.clone(),
            })
            .await;
        if let Err(e) = result {
            self.routes.lock().await.remove(&project_id);
            return Err(e);
        }
        Ok(rx)
    }

    /// Leaves a project room and drops its event route.
    ///
    /// Idempotent: unknown projects and already-closed connections are
    /// no-ops.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Transport`] if the leave message could not
    /// be written to a live socket.
    pub async fn leave_project(&self, project_id: &ProjectId) -> Result<(), SessionError> {
        let existed = self.routes.lock().await.remove(project_id).is_some();

        let mut state = self.state.lock().await;
        if !existed || state.sink.is_none() {
            return Ok(());
        }
        self.send_locked(
            &mut state,
            ClientMessage::LeaveProject {
                project_id: project_id.clone(),
            },
        )
        .await
    }

    /// Tears the connection down and drops all event routes.
    pub async fn disconnect(&self) {
        let mut state = self.state.lock().await;
        state.sink = None;
        if let Some(reader) = state.reader.take() {
            reader.abort();
        }
        self.routes.lock().await.clear();
    }

    /// Sends a message, connecting first if needed.
    async fn send(&self, message: ClientMessage) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;
        self.ensure_connected(&mut state).await?;
        self.send_locked(&mut state, message).await
    }

    /// Writes a message to the live socket, dropping the connection state
    /// on transport failure so the next call reconnects.
    async fn send_locked(
        &self,
        state: &mut ConnState,
        message: ClientMessage,
    ) -> Result<(), SessionError> {
        let json =
            serde_json::to_string(&message).map_err(|e| SessionError::Protocol(e.to_string()))?;
        let Some(sink) = state.sink.as_mut() else {
            return Err(SessionError::Transport("not connected".to_string()));
        };
        if let Err(e) = sink.send(Message::text(json)).await {
            state.sink = None;
            if let Some(reader) = state.reader.take() {
                reader.abort();
            }
            return Err(SessionError::Transport(e.to_string()));
        }
        Ok(())
    }

    /// Establishes the socket if it is not already up.
    ///
    /// A 401 handshake goes through the token manager's refresh exactly
    /// once; if the refreshed token is also rejected, `AuthExpired`
    /// surfaces. A failed refresh surfaces `SessionTerminated` — the
    /// binding never retries forever.
    async fn ensure_connected(&self, state: &mut ConnState) -> Result<(), SessionError> {
        if state.sink.is_some() {
            return Ok(());
        }

        let token = self
            .tokens
            .access_token()
            .await
            .ok_or_else(|| SessionError::SessionTerminated("no active session".to_string()))?;

        let stream = match self.connect_with(&token).await {
            Ok(stream) => stream,
            Err(ConnectError::Unauthorized) => {
                tracing::debug!("ws handshake rejected, refreshing access token");
                let fresh = self.tokens.refresh().await?;
                match self.connect_with(&fresh).await {
                    Ok(stream) => stream,
                    Err(ConnectError::Unauthorized) => return Err(SessionError::AuthExpired),
                    Err(ConnectError::Transport(e)) => return Err(SessionError::Transport(e)),
                }
            }
            Err(ConnectError::Transport(e)) => return Err(SessionError::Transport(e)),
        };

        let (sink, stream_rx) = stream.split();
        let routes = Arc::clone(&self.routes);
        state.sink = Some(sink);
        state.reader = Some(tokio::spawn(route_events(stream_rx, routes)));
        Ok(())
    }

    /// One handshake attempt with the given access token.
    async fn connect_with(&self, token: &str) -> Result<WsStream, ConnectError> {
        let mut request = self
            .gateway_url
            .as_str()
            .into_client_request()
            .map_err(|e| ConnectError::Transport(e.to_string()))?;
        let header = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| ConnectError::Transport(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, header);

        match tokio_tungstenite::connect_async(request).await {
            Ok((stream, _response)) => Ok(stream),
            Err(tungstenite::Error::Http(response))
                if response.status() == tungstenite::http::StatusCode::UNAUTHORIZED =>
            {
                Err(ConnectError::Unauthorized)
            }
            Err(e) => Err(ConnectError::Transport(e.to_string())),
        }
    }
}

/// Reader task: parses inbound frames and fans them out per project.
///
/// Events for projects with no registered route are dropped; so are
/// frames that fail to parse (logged, connection stays up).
async fn route_events(mut stream: SplitStream<WsStream>, routes: EventRoutes) {
    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<RealtimeEvent>(text.as_str()) {
                Ok(event) => {
                    let routes = routes.lock().await;
                    if let Some(tx) = routes.get(event.project_id()) {
                        let _ = tx.send(event.clone());
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "dropping unparseable gateway event");
                }
            },
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }
    tracing::debug!("realtime event stream ended");
}
