//! Terminal stream error taxonomy
//!
//! StreamError는 세션이 Failed로 끝난 이유를 분류합니다.
//! 스냅샷에 실릴 수 있도록 Clone + Serialize를 지원합니다.

use relay_transport::TransportError;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Why a session ended in `Failed`
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
pub enum StreamError {
    /// Connection-level failure (refused, dropped mid-stream)
    #[error("Transport failure: {0}")]
    Transport(String),

    /// Backend reported the task itself failed
    #[error("Server error: {0}")]
    Server(String),

    /// Stop completed successfully; the backend acknowledged the cancel
    #[error("Cancelled by user")]
    CancelledByUser,

    /// Cancellation was never acknowledged within the bounded wait
    #[error("Cancellation timed out after {0:?}")]
    CancelTimeout(Duration),

    /// Malformed or unexpected event sequence
    #[error("Protocol violation: {0}")]
    Protocol(String),
}

impl StreamError {
    /// Classify a transport error against the session's stop status
    ///
    /// While the session is `Stopping`, a terminated stream is the backend
    /// honoring the cancel, so anything short of an unacknowledged timeout
    /// counts as a successful cancellation.
    pub(crate) fn from_transport(err: TransportError, stopping: bool) -> Self {
        match err {
            TransportError::CancelTimeout(wait) => StreamError::CancelTimeout(wait),
            _ if stopping => StreamError::CancelledByUser,
            TransportError::Server(msg) => StreamError::Server(msg),
            other => StreamError::Transport(other.to_string()),
        }
    }
}

impl From<TransportError> for StreamError {
    fn from(err: TransportError) -> Self {
        StreamError::from_transport(err, false)
    }
}
