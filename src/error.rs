use std::time::Duration;

use http::StatusCode;
use thiserror::Error;

use crate::transport::TransportError;

/// Errors surfaced to callers of the session client.
///
/// `Clone` because a single refresh settlement is fanned out to every queued
/// waiter.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// No response was obtained from the transport.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Any non-success response that is not an authorization failure.
    #[error("request failed with status {status}")]
    Http { status: StatusCode, body: String },

    /// The refresh endpoint answered with a non-success status or an unusable payload.
    #[error("credential refresh failed: {reason}")]
    RefreshFailed {
        status: Option<StatusCode>,
        reason: String,
    },

    /// The refresh endpoint did not answer within the configured bound.
    #[error("credential refresh timed out after {0:?}")]
    RefreshTimeout(Duration),

    /// The refresh task went away before settling.
    #[error("credential refresh was abandoned: {0}")]
    RefreshAbandoned(String),

    /// A request that was already replayed once was rejected again.
    #[error("request was rejected again after credential refresh (status {status})")]
    RetryExhausted { status: StatusCode, body: String },

    /// The session was torn down while the request was in flight.
    #[error("session has ended, authentication required")]
    SessionEnded,

    /// A response body could not be decoded into the expected shape.
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl SessionError {
    /// Status code of the failed response, if one was received.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            SessionError::Http { status, .. } | SessionError::RetryExhausted { status, .. } => {
                Some(*status)
            }
            SessionError::RefreshFailed { status, .. } => *status,
            _ => None,
        }
    }

    /// True for outcomes that end the session rather than a single request.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionError::RefreshFailed { .. }
                | SessionError::RefreshTimeout(_)
                | SessionError::SessionEnded
        )
    }

    /// Short label used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            SessionError::Transport(_) => "transport",
            SessionError::Http { .. } => "http",
            SessionError::RefreshFailed { .. } => "refresh_failed",
            SessionError::RefreshTimeout(_) => "timeout",
            SessionError::RefreshAbandoned(_) => "abandoned",
            SessionError::RetryExhausted { .. } => "retry_exhausted",
            SessionError::SessionEnded => "session_ended",
            SessionError::Decode(_) => "decode",
        }
    }
}
