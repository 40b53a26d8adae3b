//! Single-flight credential refresh.
//!
//! Any number of callers may ask for a fresh credential at once. The first
//! one flips `in_progress` and drives exactly one call to the refresh
//! endpoint; everyone arriving while that call is outstanding parks a
//! `oneshot` waiter. The call settles once: the credential store is updated
//! (or the session torn down), the flag is cleared and the waiter list is
//! taken in the same critical section, and every taken waiter receives the
//! same outcome. Waiters registered after that belong to the next cycle.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{oneshot, Mutex};
use tokio::time::timeout;
use tracing::{debug, error, info};

use crate::cache::credential::Credential;
use crate::cache::credential_store::CredentialStore;
use crate::config::session::SessionConfig;
use crate::error::SessionError;
use crate::helpers::time::get_instant;
use crate::observability::metrics::get_metrics;
use crate::session::attacher::OutboundAttacher;
use crate::session::classifier::{Classification, FailureClassifier};
use crate::session::pending::PendingRequest;
use crate::session::teardown::SessionTeardown;
use crate::transport::{ApiRequest, ApiResponse, Transport};

type RefreshOutcome = Result<Credential, SessionError>;
type Waiter = oneshot::Sender<RefreshOutcome>;

#[derive(Debug, Clone)]
pub struct RefreshSettings {
    pub route: String,
    /// payload field carrying the new credential
    pub token_field: String,
    pub timeout: Duration,
}

impl RefreshSettings {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            route: config.refresh_route.to_owned(),
            token_field: config.refresh_token_field.to_owned(),
            timeout: Duration::from_millis(config.refresh_timeout_ms),
        }
    }
}

/// Invariant: `in_progress` is true iff one refresh call is outstanding;
/// `waiters` is non-empty only while it is. `cycle` identifies the
/// outstanding call, so only its own leader can release it.
#[derive(Default)]
struct RefreshState {
    in_progress: bool,
    cycle: u64,
    waiters: Vec<Waiter>,
}

enum Role {
    Leader(u64),
    Waiter(oneshot::Receiver<RefreshOutcome>),
}

#[derive(Clone)]
pub struct RefreshCoordinator {
    transport: Arc<dyn Transport>,
    store: CredentialStore,
    attacher: OutboundAttacher,
    classifier: FailureClassifier,
    teardown: SessionTeardown,
    settings: RefreshSettings,
    state: Arc<Mutex<RefreshState>>,
}

impl RefreshCoordinator {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: CredentialStore,
        attacher: OutboundAttacher,
        teardown: SessionTeardown,
        settings: RefreshSettings,
    ) -> Self {
        Self {
            transport,
            store,
            attacher,
            classifier: FailureClassifier::new(settings.route.to_owned()),
            teardown,
            settings,
            state: Arc::new(Mutex::new(RefreshState::default())),
        }
    }

    /// Refresh the credential, or join the refresh already in flight.
    pub async fn obtain_fresh_credential(&self) -> RefreshOutcome {
        let role = {
            let mut state = self.state.lock().await;
            Self::enter(&mut state)
        };
        self.play(role).await
    }

    /// Like `obtain_fresh_credential`, for a request that was rejected while
    /// carrying `used`. When no refresh is running and the store already moved
    /// on from `used`, the stored credential is returned without another call;
    /// when the store was emptied by a teardown the session is over.
    pub async fn obtain_fresher_than(&self, used: Option<&Credential>) -> RefreshOutcome {
        let role = {
            let mut state = self.state.lock().await;
            if !state.in_progress {
                match (used, self.store.get().await) {
                    (Some(used), Some(current)) if &current != used => {
                        debug!("credential already refreshed, reusing it");
                        return Ok(current);
                    }
                    (None, Some(current)) => return Ok(current),
                    (Some(_), None) => return Err(SessionError::SessionEnded),
                    _ => {}
                }
            }
            Self::enter(&mut state)
        };
        self.play(role).await
    }

    pub async fn is_refreshing(&self) -> bool {
        self.state.lock().await.in_progress
    }

    pub async fn queued_waiters(&self) -> usize {
        self.state.lock().await.waiters.len()
    }

    fn enter(state: &mut RefreshState) -> Role {
        if state.in_progress {
            let (tx, rx) = oneshot::channel();
            state.waiters.push(tx);
            debug!(queued = state.waiters.len(), "refresh in flight, queueing waiter");
            Role::Waiter(rx)
        } else {
            state.in_progress = true;
            state.cycle += 1;
            Role::Leader(state.cycle)
        }
    }

    async fn play(&self, role: Role) -> RefreshOutcome {
        match role {
            Role::Waiter(rx) => {
                get_metrics().await.refresh_waiters.inc();
                rx.await.unwrap_or_else(|_| {
                    Err(SessionError::RefreshAbandoned(
                        "refresh settled without answering".to_owned(),
                    ))
                })
            }
            Role::Leader(cycle) => self.lead(cycle).await,
        }
    }

    /// The refresh runs on its own task so a caller that gives up cannot
    /// leave `in_progress` set or strand the queued waiters.
    async fn lead(&self, cycle: u64) -> RefreshOutcome {
        let coordinator = self.clone();
        let task = tokio::spawn(async move {
            let outcome = coordinator.call_refresh_endpoint().await;
            coordinator.settle(cycle, outcome).await
        });

        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                // the store may already be settled or torn down; only release
                error!("refresh task failed: {}", e);
                let outcome = Err(SessionError::RefreshAbandoned(e.to_string()));
                self.release(cycle, &outcome).await;
                outcome
            }
        }
    }

    async fn call_refresh_endpoint(&self) -> RefreshOutcome {
        let metrics = get_metrics().await;
        let start = get_instant();
        metrics.refresh_calls.inc();
        info!("refreshing credential via '{}'", self.settings.route);

        let pending = PendingRequest::new(ApiRequest::post(self.settings.route.as_str(), None));
        let current = self.store.get().await;
        let request = self.attacher.attach(pending.request(), current.as_ref());

        let outcome = match timeout(self.settings.timeout, self.transport.send(request)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                metrics
                    .refresh_duration
                    .with_label_values(&["timeout"])
                    .observe(start.elapsed().as_secs_f64());
                return Err(SessionError::RefreshTimeout(self.settings.timeout));
            }
        };

        let result = match (self.classifier.classify(&pending, &outcome), outcome) {
            (Classification::Ok, Ok(response)) => self.extract_credential(&response),
            (_, Ok(response)) => Err(SessionError::RefreshFailed {
                status: Some(response.status),
                reason: format!("refresh endpoint answered {}", response.status),
            }),
            (_, Err(e)) if e.timeout => Err(SessionError::RefreshFailed {
                status: None,
                reason: format!("refresh endpoint timed out: {}", e),
            }),
            (_, Err(e)) => Err(SessionError::RefreshFailed {
                status: None,
                reason: format!("refresh endpoint unreachable: {}", e),
            }),
        };

        let label = if result.is_ok() { "ok" } else { "error" };
        metrics
            .refresh_duration
            .with_label_values(&[label])
            .observe(start.elapsed().as_secs_f64());
        result
    }

    fn extract_credential(&self, response: &ApiResponse) -> RefreshOutcome {
        let payload: Value = response.json()?;
        payload
            .get(self.settings.token_field.as_str())
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .map(Credential::new)
            .ok_or_else(|| SessionError::RefreshFailed {
                status: Some(response.status),
                reason: format!(
                    "refresh payload has no '{}' credential",
                    self.settings.token_field
                ),
            })
    }

    /// Applies the outcome to the store, then releases the cycle. Runs once
    /// per refresh call.
    async fn settle(&self, cycle: u64, outcome: RefreshOutcome) -> RefreshOutcome {
        match &outcome {
            Ok(credential) => {
                self.store.set(credential.clone()).await;
                info!("credential refreshed");
            }
            Err(e) => {
                get_metrics()
                    .await
                    .refresh_failures
                    .with_label_values(&[e.reason()])
                    .inc();
                error!("credential refresh failed: {}", e);
                self.teardown.run(e).await;
            }
        }

        self.release(cycle, &outcome).await;
        outcome
    }

    /// The only place refresh state is released. A cycle that was already
    /// released, or superseded by a newer one, is left alone.
    async fn release(&self, cycle: u64, outcome: &RefreshOutcome) {
        let waiters = {
            let mut state = self.state.lock().await;
            if !state.in_progress || state.cycle != cycle {
                debug!(cycle, "refresh cycle already released");
                return;
            }
            state.in_progress = false;
            std::mem::take(&mut state.waiters)
        };

        debug!(waiters = waiters.len(), "settling queued waiters");
        for waiter in waiters {
            // a waiter whose caller went away is simply skipped
            let _ = waiter.send(outcome.clone());
        }
    }
}
