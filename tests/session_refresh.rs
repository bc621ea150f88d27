//! Session token manager properties, driven against a local HTTP stub.
//!
//! The stub exposes a `/protected` resource that accepts exactly one
//! bearer token at a time and a `/refresh-token` endpoint that rotates
//! it, with call counters so the single-flight and retry-once guarantees
//! can be asserted exactly.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::future::join_all;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, RwLock};

use collab_gateway::client::{Session, SessionTokenManager};
use collab_gateway::error::SessionError;

/// Shared state of the stub resource server.
#[derive(Clone)]
struct Stub {
    /// The one bearer token `/protected` currently accepts.
    accepted: Arc<RwLock<String>>,
    refresh_calls: Arc<AtomicUsize>,
    protected_calls: Arc<AtomicUsize>,
    last_refresh_token: Arc<Mutex<Option<String>>>,
    /// When set, `/refresh-token` rejects every call.
    refresh_fails: bool,
    /// Artificial latency inside `/refresh-token`, long enough for every
    /// concurrent caller to hit its first 401 while the refresh runs.
    refresh_delay: Duration,
}

impl Stub {
    fn new(accepted: &str, refresh_fails: bool) -> Self {
        Self {
            accepted: Arc::new(RwLock::new(accepted.to_string())),
            refresh_calls: Arc::new(AtomicUsize::new(0)),
            protected_calls: Arc::new(AtomicUsize::new(0)),
            last_refresh_token: Arc::new(Mutex::new(None)),
            refresh_fails,
            refresh_delay: Duration::from_millis(150),
        }
    }
}

async fn protected_handler(State(stub): State<Stub>, headers: HeaderMap) -> StatusCode {
    stub.protected_calls.fetch_add(1, Ordering::SeqCst);
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");
    if token == *stub.accepted.read().await {
        StatusCode::OK
    } else {
        StatusCode::UNAUTHORIZED
    }
}

/// `/protected` variant that rejects every token, fresh or not.
async fn always_401_handler(State(stub): State<Stub>, _headers: HeaderMap) -> StatusCode {
    stub.protected_calls.fetch_add(1, Ordering::SeqCst);
    StatusCode::UNAUTHORIZED
}

async fn refresh_handler(
    State(stub): State<Stub>,
    Json(body): Json<serde_json::Value>,
) -> impl IntoResponse {
    let n = stub.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
    *stub.last_refresh_token.lock().await = body
        .get("refreshToken")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    tokio::time::sleep(stub.refresh_delay).await;

    if stub.refresh_fails {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": "refresh token revoked"})),
        );
    }

    let fresh = format!("fresh-{n}");
    *stub.accepted.write().await = fresh.clone();
    (StatusCode::OK, Json(serde_json::json!({"accessToken": fresh})))
}

async fn start_stub(stub: Stub, protected_always_401: bool) -> SocketAddr {
    let protected_route = if protected_always_401 {
        get(always_401_handler)
    } else {
        get(protected_handler)
    };
    let app = Router::new()
        .route("/protected", protected_route)
        .route("/refresh-token", post(refresh_handler))
        .with_state(stub);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn manager_for(addr: SocketAddr, access: &str) -> SessionTokenManager {
    SessionTokenManager::new(
        Session {
            access_token: access.to_string(),
            refresh_token: "refresh-secret".to_string(),
            expires_at_hint: None,
        },
        format!("http://{addr}/refresh-token"),
    )
}

#[tokio::test]
async fn concurrent_auth_failures_cause_exactly_one_refresh() {
    let stub = Stub::new("valid-before-rotation", false);
    let addr = start_stub(stub.clone(), false).await;

    // The stored access token is already stale.
    let manager = manager_for(addr, "stale");
    let client = reqwest::Client::new();
    let url = format!("http://{addr}/protected");

    let calls = (0..8).map(|_| {
        let manager = manager.clone();
        let client = client.clone();
        let url = url.clone();
        async move {
            manager
                .authorized_call(move |token| client.get(url.as_str()).bearer_auth(token))
                .await
        }
    });
    let results = join_all(calls).await;

    assert_eq!(results.len(), 8);
    for result in results {
        let response = result.expect("call should succeed after refresh");
        assert_eq!(response.status(), reqwest::StatusCode::OK);
    }
    assert_eq!(stub.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        stub.last_refresh_token.lock().await.as_deref(),
        Some("refresh-secret")
    );
    // Everyone ended up on the one new token.
    assert_eq!(manager.access_token().await.as_deref(), Some("fresh-1"));
}

#[tokio::test]
async fn concurrent_refresh_calls_share_one_outcome() {
    let stub = Stub::new("irrelevant", false);
    let addr = start_stub(stub.clone(), false).await;
    let manager = manager_for(addr, "stale");

    let refreshes = (0..5).map(|_| {
        let manager = manager.clone();
        async move { manager.refresh().await }
    });
    let results = join_all(refreshes).await;

    for result in results {
        assert_eq!(result.ok().as_deref(), Some("fresh-1"));
    }
    assert_eq!(stub.refresh_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn refresh_failure_rejects_all_queued_callers_and_clears_session() {
    let stub = Stub::new("never-valid", true);
    let addr = start_stub(stub.clone(), false).await;

    let manager = manager_for(addr, "stale");
    let client = reqwest::Client::new();
    let url = format!("http://{addr}/protected");

    let calls = (0..5).map(|_| {
        let manager = manager.clone();
        let client = client.clone();
        let url = url.clone();
        async move {
            manager
                .authorized_call(move |token| client.get(url.as_str()).bearer_auth(token))
                .await
        }
    });
    let results = join_all(calls).await;

    for result in results {
        assert!(matches!(result, Err(SessionError::SessionTerminated(_))));
    }
    // One refresh attempt, session cleared.
    assert_eq!(stub.refresh_calls.load(Ordering::SeqCst), 1);
    assert!(!manager.store().is_active().await);
}

#[tokio::test]
async fn request_failing_auth_twice_is_never_retried_a_third_time() {
    let stub = Stub::new("unused", false);
    let addr = start_stub(stub.clone(), true).await;

    let manager = manager_for(addr, "stale");
    let client = reqwest::Client::new();
    let url = format!("http://{addr}/protected");

    let result = manager
        .authorized_call(|token| client.get(url.as_str()).bearer_auth(token))
        .await;

    assert!(matches!(result, Err(SessionError::AuthExpired)));
    // Original attempt + exactly one replay.
    assert_eq!(stub.protected_calls.load(Ordering::SeqCst), 2);
    assert_eq!(stub.refresh_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn valid_token_passes_through_without_refresh() {
    let stub = Stub::new("good-token", false);
    let addr = start_stub(stub.clone(), false).await;

    let manager = manager_for(addr, "good-token");
    let client = reqwest::Client::new();
    let url = format!("http://{addr}/protected");

    let response = manager
        .authorized_call(|token| client.get(url.as_str()).bearer_auth(token))
        .await
        .expect("call should succeed");

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(stub.refresh_calls.load(Ordering::SeqCst), 0);
    assert_eq!(stub.protected_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn non_auth_failures_propagate_unchanged() {
    // No /teapot route exists on the stub, so the server answers 404 —
    // a non-auth failure the manager must hand back untouched.
    let stub = Stub::new("good-token", false);
    let addr = start_stub(stub.clone(), false).await;

    let manager = manager_for(addr, "good-token");
    let client = reqwest::Client::new();
    let url = format!("http://{addr}/teapot");

    let response = manager
        .authorized_call(|token| client.get(url.as_str()).bearer_auth(token))
        .await
        .expect("non-auth status is not an error");

    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    assert_eq!(stub.refresh_calls.load(Ordering::SeqCst), 0);
}
