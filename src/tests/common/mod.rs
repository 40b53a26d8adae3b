// tests/common/mod.rs
pub use axum::Router;
pub use serde_json::json;
pub use tokio::task::JoinHandle;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use http::header::AUTHORIZATION;
use http::StatusCode;
use tokio::sync::watch;

use crate::cache::credential::Credential;
use crate::cache::credential_store::CredentialStore;
use crate::cache::storage::MemoryStorage;
use crate::config::session::SessionConfig;
use crate::error::SessionError;
use crate::session::{SessionClient, SessionExpiredNotifier};
use crate::transport::{ApiRequest, ApiResponse, Transport, TransportError};

pub const REFRESH_ROUTE: &str = "/api/auth/token/refresh/";

/// Spawn an Axum router on an ephemeral port and return (JoinHandle, SocketAddr)
pub async fn spawn_axum(router: Router) -> (JoinHandle<()>, SocketAddr) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server failed");
    });
    (handle, addr)
}

/// In-process transport. Protected routes answer 200 only for the accepted
/// bearer; the refresh route waits for its gate and answers the scripted outcome.
pub struct ScriptedTransport {
    accepted: Mutex<String>,
    refresh_outcome: Mutex<Result<ApiResponse, TransportError>>,
    gate_tx: watch::Sender<bool>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub sent: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub fn new(accepted: &str) -> Self {
        let (gate_tx, _) = watch::channel(true);
        Self {
            accepted: Mutex::new(accepted.to_owned()),
            refresh_outcome: Mutex::new(Ok(refresh_ok("C2"))),
            gate_tx,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn set_refresh_outcome(&self, outcome: Result<ApiResponse, TransportError>) {
        *self.refresh_outcome.lock().unwrap() = outcome;
    }

    pub fn close_gate(&self) {
        self.gate_tx.send_replace(false);
    }

    pub fn open_gate(&self) {
        self.gate_tx.send_replace(true);
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Authorization headers seen on non-refresh requests, in send order
    pub fn authorizations(&self, path: &str) -> Vec<Option<String>> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == path)
            .map(|r| r.header(&AUTHORIZATION).map(str::to_owned))
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        if request.path == REFRESH_ROUTE {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let mut gate = self.gate_tx.subscribe();
            let _ = gate.wait_for(|open| *open).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            return self.refresh_outcome.lock().unwrap().clone();
        }

        let expected = format!("Bearer {}", self.accepted.lock().unwrap());
        let authorized = request.header(&AUTHORIZATION) == Some(expected.as_str());
        self.sent.lock().unwrap().push(request);
        match authorized {
            true => Ok(ApiResponse::new(StatusCode::OK, "{\"ok\":true}")),
            false => Ok(ApiResponse::new(StatusCode::UNAUTHORIZED, "{\"detail\":\"token_not_valid\"}")),
        }
    }
}

pub fn refresh_ok(token: &str) -> ApiResponse {
    ApiResponse::new(StatusCode::OK, json!({ "access": token }).to_string())
}

#[derive(Default)]
pub struct CountingNotifier {
    pub calls: AtomicUsize,
    pub reasons: Mutex<Vec<String>>,
}

impl CountingNotifier {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SessionExpiredNotifier for CountingNotifier {
    fn session_expired(&self, reason: &SessionError) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reasons.lock().unwrap().push(reason.to_string());
    }
}

/// Panics on its first notification, counts every call.
#[derive(Default)]
pub struct PanickingNotifier {
    pub calls: AtomicUsize,
}

impl PanickingNotifier {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SessionExpiredNotifier for PanickingNotifier {
    fn session_expired(&self, _reason: &SessionError) {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            panic!("navigation failed");
        }
    }
}

pub fn session_config(refresh_timeout_ms: u64) -> SessionConfig {
    SessionConfig {
        refresh_route: REFRESH_ROUTE.to_owned(),
        refresh_timeout_ms,
        ..SessionConfig::default()
    }
}

/// Client over any transport with in-memory storage, optionally logged in.
pub async fn build_client(
    transport: Arc<dyn Transport>,
    notifier: Arc<CountingNotifier>,
    credential: Option<&str>,
    config: SessionConfig,
) -> SessionClient {
    build_client_with(transport, notifier, credential, config).await
}

pub async fn build_client_with(
    transport: Arc<dyn Transport>,
    notifier: Arc<dyn SessionExpiredNotifier>,
    credential: Option<&str>,
    config: SessionConfig,
) -> SessionClient {
    let store = CredentialStore::open(Arc::new(MemoryStorage::new())).await;
    if let Some(credential) = credential {
        store.set(Credential::new(credential)).await;
    }
    SessionClient::new(transport, store, notifier, config)
}

/// Poll until `check` holds or fail after two seconds.
pub async fn wait_until<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check().await {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
