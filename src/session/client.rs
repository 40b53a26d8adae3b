use std::sync::Arc;

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast::{Receiver, Sender};
use tracing::{debug, info, warn};

use crate::cache::credential::{Credential, UserIdentity};
use crate::cache::credential_store::CredentialStore;
use crate::cache::file_storage::FileStorage;
use crate::cache::storage::{MemoryStorage, SessionStorage};
use crate::config::session::{ServiceConfig, SessionConfig, StorageConfig};
use crate::error::SessionError;
use crate::observability::metrics::get_metrics;
use crate::session::attacher::OutboundAttacher;
use crate::session::classifier::{Classification, FailureClassifier};
use crate::session::coordinator::{RefreshCoordinator, RefreshSettings};
use crate::session::dispatcher::RetryDispatcher;
use crate::session::pending::PendingRequest;
use crate::session::teardown::{SessionExpiredNotifier, SessionTeardown};
use crate::transport::{ApiRequest, ApiResponse, HttpTransport, Transport};
use crate::utils::channel::{self, SessionEvent};

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access: String,
    user: Option<UserIdentity>,
}

/// Authenticated client: every request goes through attach → send →
/// classify, and expired credentials are refreshed and the request replayed
/// without the caller noticing.
#[derive(Clone)]
pub struct SessionClient {
    transport: Arc<dyn Transport>,
    store: CredentialStore,
    attacher: OutboundAttacher,
    classifier: FailureClassifier,
    coordinator: RefreshCoordinator,
    dispatcher: RetryDispatcher,
    teardown: SessionTeardown,
    events: Sender<SessionEvent>,
    config: SessionConfig,
}

impl SessionClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: CredentialStore,
        notifier: Arc<dyn SessionExpiredNotifier>,
        config: SessionConfig,
    ) -> Self {
        let attacher = OutboundAttacher::new(config.public_routes.clone());
        let classifier = FailureClassifier::new(config.refresh_route.as_str());
        let teardown = SessionTeardown::new(store.clone(), notifier);
        let coordinator = RefreshCoordinator::new(
            transport.clone(),
            store.clone(),
            attacher.clone(),
            teardown.clone(),
            RefreshSettings::from_config(&config),
        );
        let dispatcher = RetryDispatcher::new(
            transport.clone(),
            attacher.clone(),
            classifier.clone(),
            coordinator.clone(),
        );

        Self {
            transport,
            store,
            attacher,
            classifier,
            coordinator,
            dispatcher,
            teardown,
            events: channel::run(),
            config,
        }
    }

    /// Build the reqwest transport and the configured storage, then hydrate
    /// the session from it.
    pub async fn from_config(
        config: &ServiceConfig,
        notifier: Arc<dyn SessionExpiredNotifier>,
    ) -> Result<Self> {
        let transport = HttpTransport::from_settings(&config.settings)?;
        let storage: Arc<dyn SessionStorage> = match &config.session.storage {
            StorageConfig::Memory => Arc::new(MemoryStorage::new()),
            StorageConfig::File { path } => {
                let storage = FileStorage::new(path);
                info!("session stored in '{}'", storage.path().display());
                Arc::new(storage)
            }
        };
        let store = CredentialStore::open(storage).await;
        Ok(Self::new(
            Arc::new(transport),
            store,
            notifier,
            config.session.clone(),
        ))
    }

    /// Use an existing channel for lifecycle events.
    pub fn with_events(mut self, events: Sender<SessionEvent>) -> Self {
        self.events = events;
        self
    }

    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, SessionError> {
        let pending = PendingRequest::new(request);
        let credential = self.store.get().await;
        let outgoing = self.attacher.attach(pending.request(), credential.as_ref());

        let outcome = self.transport.send(outgoing).await;
        let classification = self.classifier.classify(&pending, &outcome);
        get_metrics()
            .await
            .requests
            .with_label_values(&[classification.as_str()])
            .inc();
        debug!(
            "{} {} -> {}",
            pending.request().method,
            pending.request().path,
            classification.as_str()
        );

        match classification {
            // public routes never carried a credential, refreshing cannot help
            Classification::CredentialExpired if self.attacher.is_public(&pending.request().path) => {
                Classification::OtherError.surface(outcome)
            }
            Classification::CredentialExpired => {
                self.dispatcher.retry(pending, credential.as_ref()).await
            }
            Classification::RefreshEndpointFailed => {
                let result = classification.surface(outcome);
                if let Err(e) = &result {
                    self.teardown.run(e).await;
                }
                result
            }
            other => other.surface(outcome),
        }
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse, SessionError> {
        self.send(ApiRequest::get(path)).await
    }

    pub async fn post(&self, path: &str, body: Option<Value>) -> Result<ApiResponse, SessionError> {
        self.send(ApiRequest::post(path, body)).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, SessionError> {
        self.get(path).await?.json()
    }

    /// Exchange username/password for a credential and remember both the
    /// credential and the returned user.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<UserIdentity>, SessionError> {
        let metrics = get_metrics().await;
        let body = json!({ "username": username, "password": password });

        let response = self
            .post(&self.config.login_route, Some(body))
            .await
            .inspect_err(|e| {
                warn!("login failed for '{}': {}", username, e);
                metrics.logins.with_label_values(&["error"]).inc();
            })?;
        let login: LoginResponse = response.json()?;

        self.store
            .set_session(Credential::new(login.access), login.user.clone())
            .await;
        metrics.logins.with_label_values(&["ok"]).inc();
        info!("logged in as '{}'", username);
        let _ = self.events.send(SessionEvent::LoggedIn {
            username: username.to_owned(),
        });
        Ok(login.user)
    }

    /// Tell the server, then always drop the local session.
    pub async fn logout(&self) {
        if let Err(e) = self.post(&self.config.logout_route, None).await {
            warn!("logout on server failed, closing local session: {}", e);
        }
        self.store.clear().await;
        info!("logged out");
        let _ = self.events.send(SessionEvent::LoggedOut);
    }

    /// Revalidate a stored session against the user endpoint.
    /// Authorization failures end the session; other failures fall back to
    /// the stored user.
    pub async fn restore(&self) -> Result<Option<UserIdentity>, SessionError> {
        if self.store.get().await.is_none() {
            debug!("no stored credential, nothing to restore");
            return Ok(None);
        }

        match self.get(&self.config.user_route).await {
            Ok(response) => {
                let user: UserIdentity = response.json()?;
                self.store.set_user(user.clone()).await;
                info!("session restored for '{}'", user.username);
                Ok(Some(user))
            }
            Err(e) if e.is_terminal() || is_auth_rejection(&e) => {
                warn!("stored session rejected: {}", e);
                self.store.clear().await;
                Ok(None)
            }
            Err(e) => {
                warn!("could not validate session, using stored user: {}", e);
                Ok(self.store.user().await)
            }
        }
    }

    pub async fn current_user(&self) -> Option<UserIdentity> {
        self.store.user().await
    }

    pub async fn is_authenticated(&self) -> bool {
        self.store.get().await.is_some()
    }
}

fn is_auth_rejection(error: &SessionError) -> bool {
    error
        .status()
        .map(|status| status.as_u16() == 401 || status.as_u16() == 403)
        .unwrap_or(false)
}
