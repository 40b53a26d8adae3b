use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{error, warn};

use crate::cache::credential::{Credential, UserIdentity};
use crate::cache::storage::{SessionStorage, ACCESS_TOKEN_KEY, USER_KEY};

#[derive(Debug, Clone, Default)]
struct SessionSnapshot {
    credential: Option<Credential>,
    user: Option<UserIdentity>,
    updated_at: Option<DateTime<Utc>>,
}

/// Current credential and user identity, cached in memory in front of a
/// durable `SessionStorage`. Storage failures are logged; the in-memory
/// value always reflects the last write.
///
/// Writers hold `persist` across the memory update and the storage call so
/// storage sees writes in the same order as memory. Readers only wait for
/// the short memory update, never for storage.
#[derive(Clone)]
pub struct CredentialStore {
    inner: Arc<RwLock<SessionSnapshot>>,
    persist: Arc<Mutex<()>>,
    storage: Arc<dyn SessionStorage>,
}

impl CredentialStore {
    /// Hydrate from storage. Unreadable entries are treated as absent.
    pub async fn open(storage: Arc<dyn SessionStorage>) -> Self {
        let credential = storage
            .load(ACCESS_TOKEN_KEY)
            .await
            .inspect_err(|e| error!("failed to load stored credential: {}", e))
            .ok()
            .flatten()
            .filter(|value| !value.is_empty())
            .map(Credential::new);

        let user = storage
            .load(USER_KEY)
            .await
            .inspect_err(|e| error!("failed to load stored user: {}", e))
            .ok()
            .flatten()
            .and_then(|raw| {
                serde_json::from_str::<UserIdentity>(&raw)
                    .inspect_err(|e| warn!("ignoring unreadable stored user: {}", e))
                    .ok()
            });

        Self {
            inner: Arc::new(RwLock::new(SessionSnapshot {
                credential,
                user,
                updated_at: None,
            })),
            persist: Arc::new(Mutex::new(())),
            storage,
        }
    }

    pub async fn get(&self) -> Option<Credential> {
        self.inner.read().await.credential.clone()
    }

    pub async fn user(&self) -> Option<UserIdentity> {
        self.inner.read().await.user.clone()
    }

    /// When the credential was last written by this process
    pub async fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.inner.read().await.updated_at
    }

    pub async fn set(&self, credential: Credential) {
        let _persist = self.persist.lock().await;
        {
            let mut snapshot = self.inner.write().await;
            snapshot.credential = Some(credential.clone());
            snapshot.updated_at = Some(Utc::now());
        }
        let _ = self
            .storage
            .save(ACCESS_TOKEN_KEY, credential.as_str())
            .await
            .inspect_err(|e| error!("failed to persist credential: {}", e));
    }

    pub async fn set_user(&self, user: UserIdentity) {
        let _persist = self.persist.lock().await;
        let encoded = serde_json::to_string(&user);
        self.inner.write().await.user = Some(user);
        match encoded {
            Ok(raw) => {
                let _ = self
                    .storage
                    .save(USER_KEY, &raw)
                    .await
                    .inspect_err(|e| error!("failed to persist user: {}", e));
            }
            Err(e) => error!("failed to encode user: {}", e),
        }
    }

    /// Store the outcome of a login in one step
    pub async fn set_session(&self, credential: Credential, user: Option<UserIdentity>) {
        self.set(credential).await;
        if let Some(user) = user {
            self.set_user(user).await;
        }
    }

    /// Drop the credential and the user identity
    pub async fn clear(&self) {
        let _persist = self.persist.lock().await;
        *self.inner.write().await = SessionSnapshot::default();
        for key in [ACCESS_TOKEN_KEY, USER_KEY] {
            let _ = self
                .storage
                .remove(key)
                .await
                .inspect_err(|e| error!("failed to remove '{}' from storage: {}", key, e));
        }
    }
}
