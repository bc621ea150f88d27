//! Session token manager: transparent, race-free access-token refresh.
//!
//! Wraps outbound HTTP requests so callers never see an expired access
//! token unless the session itself is over. When a request comes back
//! 401, the manager refreshes the token and replays the request exactly
//! once. N concurrent failures coalesce into one refresh call: the first
//! caller starts it on a spawned task, everyone else subscribes to the
//! same result channel and suspends until it settles.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, broadcast};

use super::session::{Session, TokenStore};
use crate::error::SessionError;

/// Body sent to the refresh endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Body returned by the refresh endpoint on success.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    access_token: String,
}

#[derive(Debug)]
struct ManagerInner {
    store: TokenStore,
    http: reqwest::Client,
    refresh_url: String,
    /// The single in-flight refresh, if any. Holding the sender here is
    /// what makes the refresh single-flight: late arrivals subscribe to
    /// it instead of starting their own.
    inflight: Mutex<Option<broadcast::Sender<Result<String, SessionError>>>>,
}

/// Keeps one session's requests authenticated across token expiry.
///
/// Cheap to clone; all clones share the same [`TokenStore`] and the same
/// at-most-one-refresh guarantee.
#[derive(Debug, Clone)]
pub struct SessionTokenManager {
    inner: Arc<ManagerInner>,
}

impl SessionTokenManager {
    /// Creates a manager for `session`, refreshing against `refresh_url`.
    #[must_use]
    pub fn new(session: Session, refresh_url: impl Into<String>) -> Self {
        Self::with_store(TokenStore::new(session), refresh_url)
    }

    /// Creates a manager over an existing [`TokenStore`].
    #[must_use]
    pub fn with_store(store: TokenStore, refresh_url: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                store,
                http: reqwest::Client::new(),
                refresh_url: refresh_url.into(),
                inflight: Mutex::new(None),
            }),
        }
    }

    /// Returns the shared token store.
    #[must_use]
    pub fn store(&self) -> &TokenStore {
        &self.inner.store
    }

    /// Returns the current access token, if the session is active.
    pub async fn access_token(&self) -> Option<String> {
        self.inner.store.access_token().await
    }

    /// Issues an authenticated request, refreshing and replaying once on
    /// a 401.
    ///
    /// `build` constructs the request from an access token; it is called
    /// once per attempt so the replay carries the fresh token. Non-auth
    /// failures (including transport errors) propagate unchanged — they
    /// are not this component's concern.
    ///
    /// # Errors
    ///
    /// - [`SessionError::AuthExpired`] if the replayed request is rejected
    ///   again. There is never a third attempt.
    /// - [`SessionError::SessionTerminated`] if no session is active or
    ///   the refresh failed.
    /// - [`SessionError::Transport`] for connection-level failures.
    pub async fn authorized_call<F>(&self, build: F) -> Result<reqwest::Response, SessionError>
    where
        F: Fn(&str) -> reqwest::RequestBuilder + Send + Sync,
    {
        let token = self
            .inner
            .store
            .access_token()
            .await
            .ok_or_else(|| SessionError::SessionTerminated("no active session".to_string()))?;

        let response = build(&token)
            .send()
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))?;
        if response.status() != reqwest::StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        // Auth rejected: recover through the (possibly shared) refresh,
        // then replay exactly once.
        let fresh = self.refresh().await?;
        let replay = build(&fresh)
            .send()
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))?;
        if replay.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(SessionError::AuthExpired);
        }
        Ok(replay)
    }

    /// Obtains a fresh access token, coalescing concurrent callers into
    /// one refresh call.
    ///
    /// The refresh runs on a spawned task, so a caller that gets
    /// cancelled while queued cannot abort it for the others.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SessionTerminated`] when the refresh
    /// endpoint rejects the call or the session is gone; the store is
    /// cleared before any waiter is woken.
    pub async fn refresh(&self) -> Result<String, SessionError> {
        let mut rx = {
            let mut inflight = self.inner.inflight.lock().await;
            match inflight.as_ref() {
                Some(tx) => tx.subscribe(),
                None => {
                    let (tx, rx) = broadcast::channel(1);
                    *inflight = Some(tx.clone());
                    let manager = self.clone();
                    tokio::spawn(async move {
                        let outcome = manager.run_refresh().await;
                        {
                            let mut inflight = manager.inner.inflight.lock().await;
                            *inflight = None;
                        }
                        let _ = tx.send(outcome);
                    });
                    rx
                }
            }
        };

        match rx.recv().await {
            Ok(outcome) => outcome,
            Err(_) => Err(SessionError::Transport(
                "refresh result channel closed".to_string(),
            )),
        }
    }

    /// Ends the session explicitly.
    pub async fn logout(&self) {
        self.inner.store.clear().await;
    }

    /// The actual refresh exchange. Any failure is terminal for the
    /// session: the store is cleared and the error reported to every
    /// waiter.
    async fn run_refresh(&self) -> Result<String, SessionError> {
        let Some(refresh_token) = self.inner.store.refresh_token().await else {
            return Err(SessionError::SessionTerminated(
                "no active session".to_string(),
            ));
        };

        let outcome = self
            .inner
            .http
            .post(self.inner.refresh_url.as_str())
            .json(&RefreshRequest {
                refresh_token: &refresh_token,
            })
            .send()
            .await;

        let response = match outcome {
            Ok(response) => response,
            Err(e) => {
                self.inner.store.clear().await;
                return Err(SessionError::SessionTerminated(format!(
                    "refresh request failed: {e}"
                )));
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            self.inner.store.clear().await;
            return Err(SessionError::SessionTerminated(format!(
                "refresh rejected with status {status}"
            )));
        }

        let body = match response.json::<RefreshResponse>().await {
            Ok(body) => body,
            Err(e) => {
                self.inner.store.clear().await;
                return Err(SessionError::SessionTerminated(format!(
                    "malformed refresh response: {e}"
                )));
            }
        };

        self.inner
            .store
            .replace_access_token(body.access_token.clone())
            .await;
        tracing::debug!("access token refreshed");
        Ok(body.access_token)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session {
            access_token: "access-1".to_string(),
            refresh_token: "refresh-1".to_string(),
            expires_at_hint: None,
        }
    }

    #[tokio::test]
    async fn refresh_without_session_terminates() {
        let manager =
            SessionTokenManager::with_store(TokenStore::empty(), "http://127.0.0.1:1/refresh");
        let result = manager.refresh().await;
        assert!(matches!(result, Err(SessionError::SessionTerminated(_))));
    }

    #[tokio::test]
    async fn authorized_call_without_session_terminates() {
        let manager =
            SessionTokenManager::with_store(TokenStore::empty(), "http://127.0.0.1:1/refresh");
        let client = reqwest::Client::new();
        let result = manager
            .authorized_call(|token| {
                client
                    .get("http://127.0.0.1:1/anything")
                    .bearer_auth(token)
            })
            .await;
        assert!(matches!(result, Err(SessionError::SessionTerminated(_))));
    }

    #[tokio::test]
    async fn unreachable_refresh_endpoint_clears_session() {
        // Port 1 refuses connections; the transport failure must be
        // terminal for the session.
        let manager = SessionTokenManager::new(session(), "http://127.0.0.1:1/refresh");
        let result = manager.refresh().await;
        assert!(matches!(result, Err(SessionError::SessionTerminated(_))));
        assert!(!manager.store().is_active().await);
    }

    #[tokio::test]
    async fn logout_clears_the_store() {
        let manager = SessionTokenManager::new(session(), "http://127.0.0.1:1/refresh");
        assert!(manager.store().is_active().await);
        manager.logout().await;
        assert!(!manager.store().is_active().await);
        assert_eq!(manager.access_token().await, None);
    }
}
