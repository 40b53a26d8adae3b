use std::sync::Arc;

use tokio::sync::broadcast::Sender;
use tracing::{debug, warn};

use crate::cache::credential_store::CredentialStore;
use crate::error::SessionError;
use crate::observability::metrics::get_metrics;
use crate::utils::channel::SessionEvent;

/// Told once per unrecoverable refresh failure that the session is over.
/// Redirecting the user to the login entry point is up to the implementor.
pub trait SessionExpiredNotifier: Send + Sync {
    fn session_expired(&self, reason: &SessionError);
}

impl SessionExpiredNotifier for Sender<SessionEvent> {
    fn session_expired(&self, reason: &SessionError) {
        let _ = self
            .send(SessionEvent::Ended {
                reason: reason.to_string(),
            })
            .inspect_err(|_| debug!("no subscribers for session events"));
    }
}

/// Clears the credential store and fires the notifier. Only the refresh
/// coordinator's failure settlement calls this for queued requests, so a
/// burst of rejected waiters still ends the session once.
#[derive(Clone)]
pub struct SessionTeardown {
    store: CredentialStore,
    notifier: Arc<dyn SessionExpiredNotifier>,
}

impl SessionTeardown {
    pub fn new(store: CredentialStore, notifier: Arc<dyn SessionExpiredNotifier>) -> Self {
        Self { store, notifier }
    }

    pub async fn run(&self, reason: &SessionError) {
        warn!("session ended: {}", reason);
        self.store.clear().await;
        get_metrics().await.session_teardowns.inc();
        self.notifier.session_expired(reason);
    }
}
