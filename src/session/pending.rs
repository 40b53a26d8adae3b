use crate::transport::ApiRequest;

/// Snapshot of a dispatched request plus the "already retried" marker.
/// The snapshot never carries the Authorization header; it is attached
/// fresh on every send.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRequest {
    request: ApiRequest,
    retried: bool,
}

impl PendingRequest {
    pub fn new(request: ApiRequest) -> Self {
        Self {
            request,
            retried: false,
        }
    }

    pub fn request(&self) -> &ApiRequest {
        &self.request
    }

    pub fn is_retried(&self) -> bool {
        self.retried
    }

    /// Consume the descriptor for its single replay.
    pub fn into_retried(self) -> Self {
        Self {
            retried: true,
            ..self
        }
    }
}
