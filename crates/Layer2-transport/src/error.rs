//! Transport-specific error types
//!
//! TransportError는 연결 수준의 실패를 관리합니다.
//! relay_foundation::Error와의 변환을 지원합니다.

use relay_foundation::Error as FoundationError;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur on one chunked connection
///
/// Clone-able so it can travel inside stream events.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Failed to establish the connection (refused, DNS, connect timeout)
    #[error("Connect failed: {0}")]
    Connect(String),

    /// Backend rejected the stream request outright
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Connection dropped mid-stream before a terminal event
    #[error("Stream dropped: {0}")]
    Dropped(String),

    /// Backend reported the task itself failed
    #[error("Server error: {0}")]
    Server(String),

    /// Cancellation was requested but never acknowledged in time
    #[error("Cancellation not acknowledged within {0:?}")]
    CancelTimeout(Duration),
}

impl TransportError {
    /// Create from HTTP status code and body
    pub fn from_http_status(status: u16, body: &str) -> Self {
        match status {
            500..=599 => TransportError::Server(format!("HTTP {}: {}", status, body)),
            _ => TransportError::Http {
                status,
                message: body.to_string(),
            },
        }
    }
}

// ============================================================================
// relay_foundation::Error 변환
// ============================================================================

impl From<TransportError> for FoundationError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Connect(msg) => FoundationError::Transport(msg),
            TransportError::Http { status, message } => {
                FoundationError::Http(format!("HTTP {}: {}", status, message))
            }
            TransportError::Dropped(msg) => FoundationError::Transport(msg),
            TransportError::Server(msg) => FoundationError::Transport(msg),
            TransportError::CancelTimeout(wait) => {
                FoundationError::Timeout(format!("cancel not acknowledged within {:?}", wait))
            }
        }
    }
}
