use std::sync::Arc;

use http::StatusCode;
use tracing::{debug, warn};

use crate::cache::credential::Credential;
use crate::error::SessionError;
use crate::observability::metrics::get_metrics;
use crate::session::attacher::OutboundAttacher;
use crate::session::classifier::FailureClassifier;
use crate::session::coordinator::RefreshCoordinator;
use crate::session::pending::PendingRequest;
use crate::transport::{ApiResponse, Transport};

/// Replays a request rejected for an expired credential, exactly once.
#[derive(Clone)]
pub struct RetryDispatcher {
    transport: Arc<dyn Transport>,
    attacher: OutboundAttacher,
    classifier: FailureClassifier,
    coordinator: RefreshCoordinator,
}

impl RetryDispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        attacher: OutboundAttacher,
        classifier: FailureClassifier,
        coordinator: RefreshCoordinator,
    ) -> Self {
        Self {
            transport,
            attacher,
            classifier,
            coordinator,
        }
    }

    /// `used` is the credential the rejected attempt carried.
    pub async fn retry(
        &self,
        pending: PendingRequest,
        used: Option<&Credential>,
    ) -> Result<ApiResponse, SessionError> {
        if pending.is_retried() {
            warn!("refusing to replay '{}' a second time", pending.request().path);
            return Err(SessionError::RetryExhausted {
                status: StatusCode::UNAUTHORIZED,
                body: String::new(),
            });
        }

        let credential = self.coordinator.obtain_fresher_than(used).await?;

        let pending = pending.into_retried();
        let request = self.attacher.attach(pending.request(), Some(&credential));
        debug!("replaying {} {}", request.method, request.path);

        let outcome = self.transport.send(request).await;
        let classification = self.classifier.classify(&pending, &outcome);
        get_metrics()
            .await
            .retries
            .with_label_values(&[classification.as_str()])
            .inc();

        classification.surface(outcome)
    }
}
