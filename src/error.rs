//! Error types for the gateway and the client session layer.
//!
//! [`GatewayError`] is the server-side error type: each variant maps to an
//! HTTP status code and structured JSON error response, used primarily to
//! reject WebSocket handshakes. [`SessionError`] is the client-side type;
//! it is `Clone` so a single refresh outcome can fan out to every caller
//! queued on it.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 4001,
///     "message": "not authenticated: token rejected",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// Authentication errors always close (or refuse) the connection; protocol
/// errors are logged and swallowed at the gateway boundary and never
/// disconnect a peer; internal errors are fatal for the affected
/// connection only.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The handshake bearer token was missing, expired, or invalid.
    #[error("not authenticated: {0}")]
    NotAuthenticated(String),

    /// A client message could not be parsed or referenced an unknown type.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Internal registry inconsistency.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::NotAuthenticated(_) => 4001,
            Self::Protocol(_) => 4002,
            Self::Internal(_) => 5000,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::NotAuthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Protocol(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

/// Client-side session error.
///
/// `AuthExpired` is recovered locally by the
/// [`crate::client::SessionTokenManager`] and only surfaces when a request
/// fails auth again after its single replay. `SessionTerminated` means the
/// refresh itself failed: the session is cleared and the caller must
/// re-authenticate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The access token was rejected and the replay was rejected too.
    #[error("access token rejected after refresh")]
    AuthExpired,

    /// The refresh call failed; the session is over.
    #[error("session terminated: {0}")]
    SessionTerminated(String),

    /// Connection-level failure on the wrapped request or the socket.
    #[error("transport error: {0}")]
    Transport(String),

    /// The peer sent something that could not be understood.
    #[error("protocol error: {0}")]
    Protocol(String),
}
