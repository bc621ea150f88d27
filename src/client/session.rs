//! Session state: the access/refresh token pair for one logged-in user.

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

/// Credentials for one logical user session.
#[derive(Debug, Clone)]
pub struct Session {
    /// Short-lived bearer token attached to every request.
    pub access_token: String,
    /// Long-lived token exchanged for new access tokens.
    pub refresh_token: String,
    /// Server-provided expiry hint. Advisory only: the authoritative
    /// signal that a token died is the 401 on the next request.
    pub expires_at_hint: Option<DateTime<Utc>>,
}

/// Holds the current [`Session`], if any.
///
/// Pure state, no I/O. Mutated only by the
/// [`crate::client::SessionTokenManager`]: installed at login, the access
/// token swapped on refresh, cleared on refresh failure or logout.
#[derive(Debug, Default)]
pub struct TokenStore {
    session: RwLock<Option<Session>>,
}

impl TokenStore {
    /// Creates a store holding the given session.
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self {
            session: RwLock::new(Some(session)),
        }
    }

    /// Creates a store with no session (logged out).
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns the current access token, if a session is active.
    pub async fn access_token(&self) -> Option<String> {
        let session = self.session.read().await;
        session.as_ref().map(|s| s.access_token.clone())
    }

    /// Returns the current refresh token, if a session is active.
    pub async fn refresh_token(&self) -> Option<String> {
        let session = self.session.read().await;
        session.as_ref().map(|s| s.refresh_token.clone())
    }

    /// Installs a new session, replacing whatever was there.
    pub async fn install(&self, session: Session) {
        let mut slot = self.session.write().await;
        *slot = Some(session);
    }

    /// Swaps in a fresh access token, keeping the refresh token.
    ///
    /// A no-op when the session was already cleared.
    pub async fn replace_access_token(&self, access_token: String) {
        let mut slot = self.session.write().await;
        if let Some(session) = slot.as_mut() {
            session.access_token = access_token;
        }
    }

    /// Clears the session.
    pub async fn clear(&self) {
        let mut slot = self.session.write().await;
        *slot = None;
    }

    /// Returns `true` while a session is installed.
    pub async fn is_active(&self) -> bool {
        self.session.read().await.is_some()
    }
}
