use http::StatusCode;

use crate::error::SessionError;
use crate::session::pending::PendingRequest;
use crate::transport::{ApiResponse, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Ok,
    /// authorization failure on a request that has not been replayed yet
    CredentialExpired,
    /// authorization failure on the single replay; never triggers another refresh
    RetryExhausted,
    /// the refresh endpoint itself did not succeed
    RefreshEndpointFailed,
    /// anything else, passed through unchanged
    OtherError,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Ok => "ok",
            Classification::CredentialExpired => "credential_expired",
            Classification::RetryExhausted => "retry_exhausted",
            Classification::RefreshEndpointFailed => "refresh_endpoint_failed",
            Classification::OtherError => "other_error",
        }
    }

    /// Turn a transport outcome into what the caller sees under this classification.
    pub fn surface(
        self,
        outcome: Result<ApiResponse, TransportError>,
    ) -> Result<ApiResponse, SessionError> {
        let response = outcome?;
        match self {
            Classification::Ok => Ok(response),
            Classification::RetryExhausted => Err(SessionError::RetryExhausted {
                status: response.status,
                body: response.body,
            }),
            Classification::RefreshEndpointFailed => Err(SessionError::RefreshFailed {
                status: Some(response.status),
                reason: format!("refresh endpoint answered {}", response.status),
            }),
            Classification::CredentialExpired | Classification::OtherError => {
                Err(SessionError::Http {
                    status: response.status,
                    body: response.body,
                })
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct FailureClassifier {
    refresh_route: String,
}

impl FailureClassifier {
    pub fn new(refresh_route: impl Into<String>) -> Self {
        Self {
            refresh_route: refresh_route.into(),
        }
    }

    pub fn is_refresh_route(&self, path: &str) -> bool {
        path.contains(self.refresh_route.as_str())
    }

    pub fn classify(
        &self,
        pending: &PendingRequest,
        outcome: &Result<ApiResponse, TransportError>,
    ) -> Classification {
        let response = match outcome {
            Ok(response) => response,
            Err(_) => return Classification::OtherError,
        };

        if response.is_success() {
            return Classification::Ok;
        }
        if self.is_refresh_route(&pending.request().path) {
            return Classification::RefreshEndpointFailed;
        }
        if response.status == StatusCode::UNAUTHORIZED {
            return match pending.is_retried() {
                true => Classification::RetryExhausted,
                false => Classification::CredentialExpired,
            };
        }
        Classification::OtherError
    }
}
