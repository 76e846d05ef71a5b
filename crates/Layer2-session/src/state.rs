//! Session state machine

use serde::{Deserialize, Serialize};

/// Possible states of a stream session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Session is constructed but the transport is not open yet
    Idle,

    /// Transport is open and fragments are arriving
    Streaming,

    /// Cancellation requested; trailing fragments may still arrive
    Stopping,

    /// Stream finished successfully
    Completed,

    /// Stream ended with an error (including acknowledged cancellation)
    Failed,
}

impl SessionState {
    /// Check if this is a terminal state (cannot transition further)
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed)
    }

    /// Check if the session has a live transport
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Streaming | SessionState::Stopping)
    }

    /// Whether content may still be appended in this state
    pub fn accepts_fragments(&self) -> bool {
        matches!(self, SessionState::Streaming | SessionState::Stopping)
    }

    /// Get display name for the state
    pub fn display_name(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Streaming => "Streaming",
            SessionState::Stopping => "Stopping",
            SessionState::Completed => "Completed",
            SessionState::Failed => "Failed",
        }
    }

    /// Get a symbol for the state (for TUI)
    pub fn symbol(&self) -> &'static str {
        match self {
            SessionState::Idle => "◯",
            SessionState::Streaming => "⟳",
            SessionState::Stopping => "⊘",
            SessionState::Completed => "✓",
            SessionState::Failed => "✗",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}
