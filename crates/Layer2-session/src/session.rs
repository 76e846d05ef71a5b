//! Session - one streaming exchange for one task attempt
//!
//! The session owns the append-only content buffer and the lifecycle state.
//! It is mutated only under the registry's map lock, by the single consumer
//! task of its transport (plus the stop command).

use crate::error::StreamError;
use crate::key::SessionKey;
use crate::state::SessionState;
use chrono::{DateTime, Utc};
use relay_foundation::{AttachmentRef, StartRequest, SubtaskId, TaskId};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A stream session
pub struct StreamSession {
    /// Currently-effective key (provisional until resolved)
    key: SessionKey,

    /// Current lifecycle state
    state: SessionState,

    /// Append-only accumulated response content
    content: String,

    /// User message retained for optimistic display
    pending_message: Option<String>,

    /// Attachment reference retained for optimistic display
    pending_attachment: Option<AttachmentRef>,

    /// Exchange id within the task, once the backend assigns it
    subtask_id: Option<SubtaskId>,

    /// Populated only in `Failed`
    error: Option<StreamError>,

    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,

    /// Cooperative cancellation for the live transport
    cancel: CancellationToken,

    /// State change signal for stop-waiters
    state_tx: watch::Sender<SessionState>,

    /// Identity resolution happens at most once
    resolved: bool,
}

impl StreamSession {
    /// Create a new session in `Idle`
    pub fn new(key: SessionKey, request: &StartRequest, cancel: CancellationToken) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        Self {
            key,
            state: SessionState::Idle,
            content: String::new(),
            pending_message: Some(request.message.clone()),
            pending_attachment: request.attachment.clone(),
            subtask_id: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            cancel,
            state_tx,
            resolved: false,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn key(&self) -> SessionKey {
        self.key
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn subtask(&self) -> Option<SubtaskId> {
        self.subtask_id
    }

    /// Cancellation token for the live transport
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Subscribe to state changes (used by bounded stop waits)
    pub fn state_rx(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Streaming duration so far, if the session has started
    pub fn duration(&self) -> Option<Duration> {
        let start = self.started_at?;
        let end = self.completed_at.unwrap_or_else(Utc::now);
        (end - start).to_std().ok()
    }

    // ========================================================================
    // Lifecycle transitions
    // ========================================================================

    /// Mark the session streaming (transport opened)
    pub fn start(&mut self) {
        self.state = SessionState::Streaming;
        self.started_at = Some(Utc::now());
        self.state_tx.send_replace(self.state);
    }

    /// Append one content fragment
    ///
    /// Accepted while `Streaming` and, for trailing in-flight fragments,
    /// while `Stopping`. Returns whether the fragment was applied.
    pub fn append(&mut self, fragment: &str) -> bool {
        if !self.state.accepts_fragments() {
            debug!(key = %self.key, state = %self.state, "Discarding fragment for inactive session");
            return false;
        }
        self.content.push_str(fragment);
        true
    }

    /// Record the backend-assigned exchange id
    ///
    /// A duplicate resolution is a protocol no-op.
    pub fn set_subtask(&mut self, subtask_id: SubtaskId) -> bool {
        if self.state.is_terminal() {
            debug!(key = %self.key, "Discarding subtask resolution for terminal session");
            return false;
        }
        if self.subtask_id.is_some() {
            debug!(key = %self.key, "Ignoring duplicate subtask resolution");
            return false;
        }
        self.subtask_id = Some(subtask_id);
        true
    }

    /// Adopt the durable task id; at most once per session
    ///
    /// A key change only, never a state change. Returns false (and leaves the
    /// session untouched) when the session is already resolved, already
    /// durably keyed, or terminal.
    pub fn resolve(&mut self, task_id: TaskId) -> bool {
        if self.resolved || self.key.is_durable() {
            debug!(key = %self.key, "Ignoring duplicate identity resolution");
            return false;
        }
        if self.state.is_terminal() {
            debug!(key = %self.key, "Discarding identity resolution for terminal session");
            return false;
        }
        self.key = SessionKey::Durable(task_id);
        self.resolved = true;
        true
    }

    /// Request cancellation: `Streaming` → `Stopping`
    ///
    /// Idempotent; returns whether the state actually changed.
    pub fn begin_stop(&mut self) -> bool {
        if self.state != SessionState::Streaming {
            return false;
        }
        self.state = SessionState::Stopping;
        self.state_tx.send_replace(self.state);
        true
    }

    /// Terminal transition on natural completion
    ///
    /// First terminal event wins; anything after is a no-op. Pending input is
    /// cleared — the confirmed exchange supersedes the optimistic copy.
    pub fn complete(&mut self, subtask_id: Option<SubtaskId>) -> bool {
        if self.state.is_terminal() {
            debug!(key = %self.key, "Ignoring completion for terminal session");
            return false;
        }
        if let Some(id) = subtask_id {
            self.subtask_id.get_or_insert(id);
        }
        self.state = SessionState::Completed;
        self.completed_at = Some(Utc::now());
        self.pending_message = None;
        self.pending_attachment = None;
        self.state_tx.send_replace(self.state);
        true
    }

    /// Terminal transition on failure
    ///
    /// First terminal event wins. Content and pending input are retained for
    /// inspection and retry.
    pub fn fail(&mut self, error: StreamError) -> bool {
        if self.state.is_terminal() {
            debug!(key = %self.key, "Ignoring error for terminal session");
            return false;
        }
        self.state = SessionState::Failed;
        self.completed_at = Some(Utc::now());
        self.error = Some(error);
        self.state_tx.send_replace(self.state);
        true
    }

    /// Read-only snapshot of the current state
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            key: self.key,
            state: self.state,
            content: self.content.clone(),
            pending_message: self.pending_message.clone(),
            pending_attachment: self.pending_attachment.clone(),
            subtask_id: self.subtask_id,
            error: self.error.clone(),
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
        }
    }
}

/// Consistent point-in-time view of a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub key: SessionKey,
    pub state: SessionState,
    pub content: String,
    pub pending_message: Option<String>,
    pub pending_attachment: Option<AttachmentRef>,
    pub subtask_id: Option<SubtaskId>,
    pub error: Option<StreamError>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SessionSnapshot {
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn streaming_session() -> StreamSession {
        let request = StartRequest::new("Hello");
        let mut session = StreamSession::new(
            SessionKey::provisional(),
            &request,
            CancellationToken::new(),
        );
        session.start();
        session
    }

    #[test]
    fn test_append_only_while_live() {
        let mut session = streaming_session();
        assert!(session.append("He"));
        assert!(session.append("llo"));
        assert_eq!(session.snapshot().content, "Hello");

        session.complete(None);
        assert!(!session.append("!"));
        assert_eq!(session.snapshot().content, "Hello");
    }

    #[test]
    fn test_stopping_accepts_trailing_fragments() {
        let mut session = streaming_session();
        assert!(session.append("partial"));
        assert!(session.begin_stop());
        assert!(session.append(" tail"));
        assert_eq!(session.snapshot().content, "partial tail");
    }

    #[test]
    fn test_first_terminal_event_wins() {
        let mut session = streaming_session();
        assert!(session.complete(None));
        assert!(!session.fail(StreamError::Server("late".into())));

        let snapshot = session.snapshot();
        assert_eq!(snapshot.state, SessionState::Completed);
        assert!(snapshot.error.is_none());
    }

    #[test]
    fn test_complete_clears_pending_fail_keeps_it() {
        let mut completed = streaming_session();
        completed.complete(None);
        assert!(completed.snapshot().pending_message.is_none());

        let mut failed = streaming_session();
        failed.append("partial");
        failed.fail(StreamError::Transport("dropped".into()));
        let snapshot = failed.snapshot();
        assert_eq!(snapshot.pending_message.as_deref(), Some("Hello"));
        assert_eq!(snapshot.content, "partial");
        assert!(matches!(snapshot.error, Some(StreamError::Transport(_))));
    }

    #[test]
    fn test_resolve_exactly_once() {
        let mut session = streaming_session();
        assert!(session.resolve(TaskId(42)));
        assert_eq!(session.key(), SessionKey::Durable(TaskId(42)));

        assert!(!session.resolve(TaskId(43)));
        assert_eq!(session.key(), SessionKey::Durable(TaskId(42)));
    }

    #[test]
    fn test_resolve_preserves_buffered_state() {
        let mut session = streaming_session();
        session.append("Hel");
        session.set_subtask(SubtaskId(7));
        session.resolve(TaskId(42));
        session.append("lo");

        let snapshot = session.snapshot();
        assert_eq!(snapshot.content, "Hello");
        assert_eq!(snapshot.subtask_id, Some(SubtaskId(7)));
        assert_eq!(snapshot.pending_message.as_deref(), Some("Hello"));
    }

    #[test]
    fn test_duplicate_subtask_ignored() {
        let mut session = streaming_session();
        assert!(session.set_subtask(SubtaskId(1)));
        assert!(!session.set_subtask(SubtaskId(2)));
        assert_eq!(session.snapshot().subtask_id, Some(SubtaskId(1)));
    }

    #[test]
    fn test_begin_stop_idempotent() {
        let mut session = streaming_session();
        assert!(session.begin_stop());
        assert!(!session.begin_stop());
        assert_eq!(session.state(), SessionState::Stopping);
    }

    #[test]
    fn test_complete_records_subtask_from_terminal_event() {
        let mut session = streaming_session();
        session.complete(Some(SubtaskId(9)));
        assert_eq!(session.snapshot().subtask_id, Some(SubtaskId(9)));
    }

    #[test]
    fn test_state_watch_signals_terminal() {
        let mut session = streaming_session();
        let rx = session.state_rx();
        session.fail(StreamError::CancelledByUser);
        assert!(rx.borrow().is_terminal());
    }
}
