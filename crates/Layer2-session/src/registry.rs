//! Session Registry - supervises all stream sessions
//!
//! The sole place allowed to create, rekey, query, or retire sessions. One
//! consumer task per session translates transport events into session
//! mutations; every mutation happens under the map's write lock, held only
//! for the mutation itself and never across an await, so operations on a
//! single key are linearizable while reads stay cheap.

use crate::error::StreamError;
use crate::identity;
use crate::key::SessionKey;
use crate::session::{SessionSnapshot, StreamSession};
use crate::state::SessionState;
use futures::StreamExt;
use relay_foundation::{AttemptId, Error, Result, StartRequest, StreamConfig, SubtaskId, TaskId};
use relay_transport::{EventStream, StreamEvent, StreamTransport, TransportError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, watch, RwLock};
use tokio::time::{timeout, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// ============================================================================
// Notices & Callbacks
// ============================================================================

/// Coarse notification about a session, broadcast to subscribers
///
/// Subscribers re-poll [`SessionRegistry::get`] for detail; detaching a
/// receiver never affects the underlying session.
#[derive(Debug, Clone)]
pub enum SessionNotice {
    /// A session was created and its transport opened
    Started { key: SessionKey },

    /// A session moved from its provisional key to the durable key
    Resolved { from: SessionKey, to: SessionKey },

    /// Content or lifecycle detail changed under this key
    Updated { key: SessionKey },

    /// The session reached a terminal state (still queryable until reset)
    Terminated { key: SessionKey, state: SessionState },
}

type IdentityCallback = Box<dyn Fn(TaskId) + Send + Sync>;
type CompleteCallback = Box<dyn Fn(TaskId, Option<SubtaskId>) + Send + Sync>;
type ErrorCallback = Box<dyn Fn(&StreamError) + Send + Sync>;

/// Caller-supplied notification hooks for one session
///
/// Each hook is optional and invoked from the session's consumer task,
/// outside any registry lock.
#[derive(Default)]
pub struct StartCallbacks {
    on_identity_resolved: Option<IdentityCallback>,
    on_complete: Option<CompleteCallback>,
    on_error: Option<ErrorCallback>,
}

impl StartCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once when the backend assigns the durable task id
    pub fn on_identity_resolved(mut self, f: impl Fn(TaskId) + Send + Sync + 'static) -> Self {
        self.on_identity_resolved = Some(Box::new(f));
        self
    }

    /// Called on natural completion
    pub fn on_complete(
        mut self,
        f: impl Fn(TaskId, Option<SubtaskId>) + Send + Sync + 'static,
    ) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }

    /// Called when the session fails (including acknowledged cancellation)
    pub fn on_error(mut self, f: impl Fn(&StreamError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    fn notify_identity(&self, task_id: TaskId) {
        if let Some(f) = &self.on_identity_resolved {
            f(task_id);
        }
    }

    fn notify_complete(&self, task_id: TaskId, subtask_id: Option<SubtaskId>) {
        if let Some(f) = &self.on_complete {
            f(task_id, subtask_id);
        }
    }

    fn notify_error(&self, error: &StreamError) {
        if let Some(f) = &self.on_error {
            f(error);
        }
    }
}

// ============================================================================
// SessionRegistry
// ============================================================================

/// Supervising map from session key to session
///
/// Process-wide value with an explicit lifecycle: constructed once with a
/// transport, torn down with [`SessionRegistry::shutdown`].
#[derive(Clone)]
pub struct SessionRegistry {
    /// All sessions by their currently-effective key
    sessions: Arc<RwLock<HashMap<SessionKey, StreamSession>>>,

    /// Transport used to open one connection per session attempt
    transport: Arc<dyn StreamTransport>,

    /// Stream policy (cancel grace, optional concurrency cap)
    config: StreamConfig,

    /// Broadcast channel for session notices
    notices: broadcast::Sender<SessionNotice>,
}

impl SessionRegistry {
    /// Create a new registry over the given transport
    pub fn new(transport: Arc<dyn StreamTransport>, config: StreamConfig) -> Self {
        let (notices, _) = broadcast::channel(config.notice_capacity.max(1));
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            transport,
            config,
            notices,
        }
    }

    /// Subscribe to session notices
    pub fn subscribe(&self) -> broadcast::Receiver<SessionNotice> {
        self.notices.subscribe()
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Start a streaming exchange; non-blocking
    ///
    /// Returns the session key: provisional for a brand-new task, the durable
    /// task key when `request.task_id` targets an existing task. Fails when
    /// the key already has a live stream or the concurrency cap is reached.
    pub async fn start(
        &self,
        request: StartRequest,
        callbacks: StartCallbacks,
    ) -> Result<SessionKey> {
        let attempt = AttemptId::new();
        let key = match request.task_id {
            Some(task_id) => SessionKey::Durable(task_id),
            None => SessionKey::Provisional(attempt),
        };

        let cancel = CancellationToken::new();
        {
            let mut sessions = self.sessions.write().await;

            if let Some(cap) = self.config.max_concurrent {
                let live = sessions.values().filter(|s| s.is_active()).count();
                if live >= cap {
                    return Err(Error::Session(format!(
                        "concurrent session cap ({}) reached",
                        cap
                    )));
                }
            }

            if let Some(existing) = sessions.get(&key) {
                if existing.is_active() {
                    return Err(Error::Session(format!("{} already has a live stream", key)));
                }
                debug!(%key, "Replacing terminal session with a fresh exchange");
            }

            let mut session = StreamSession::new(key, &request, cancel.clone());
            session.start();
            sessions.insert(key, session);
        }

        let _ = self.notices.send(SessionNotice::Started { key });
        info!(%key, "Session started");

        let stream = self.transport.open(request, attempt, cancel);
        let registry = self.clone();
        tokio::spawn(async move {
            registry.consume(key, stream, callbacks).await;
        });

        Ok(key)
    }

    /// Request cancellation; bounded wait for the terminal state
    ///
    /// Idempotent: an already-terminal session just reports its state. When
    /// the cancel is not acknowledged within the configured grace the session
    /// is forced to `Failed` with a timeout error rather than left hanging.
    pub async fn stop(&self, key: SessionKey) -> Result<SessionState> {
        let (state_rx, cancel, changed) = {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .get_mut(&key)
                .ok_or_else(|| Error::NotFound(key.to_string()))?;

            if session.is_terminal() {
                return Ok(session.state());
            }

            let changed = session.begin_stop();
            (session.state_rx(), session.cancel_token(), changed)
        };

        if changed {
            let _ = self.notices.send(SessionNotice::Updated { key });
            info!(%key, "Stop requested");
        }
        cancel.cancel();

        let grace = self.config.cancel_grace();
        match timeout(grace, wait_for_terminal(state_rx)).await {
            Ok(state) => Ok(state),
            Err(_) => {
                warn!(%key, "Cancellation not acknowledged in time; forcing failure");
                self.force_fail(key, StreamError::CancelTimeout(grace)).await
            }
        }
    }

    /// Remove a terminal session from the registry
    ///
    /// Rejected for live sessions — dropping one would orphan a real backend
    /// stream with no observer.
    pub async fn reset(&self, key: SessionKey) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        match sessions.get(&key) {
            None => Err(Error::NotFound(key.to_string())),
            Some(session) if !session.is_terminal() => {
                Err(Error::SessionNotTerminal(key.to_string()))
            }
            Some(_) => {
                sessions.remove(&key);
                debug!(%key, "Session reset");
                Ok(())
            }
        }
    }

    /// Force-cancel every live session and drain, bounded by the cancel grace
    pub async fn shutdown(&self) {
        info!("Shutting down session registry");

        let waiters: Vec<(SessionKey, watch::Receiver<SessionState>, CancellationToken)> = {
            let sessions = self.sessions.read().await;
            sessions
                .iter()
                .filter(|(_, s)| s.is_active())
                .map(|(key, s)| (*key, s.state_rx(), s.cancel_token()))
                .collect()
        };

        for (_, _, cancel) in &waiters {
            cancel.cancel();
        }

        let deadline = Instant::now() + self.config.cancel_grace();
        for (key, state_rx, _) in waiters {
            if timeout_at(deadline, wait_for_terminal(state_rx)).await.is_err() {
                let _ = self
                    .force_fail(key, StreamError::CancelTimeout(self.config.cancel_grace()))
                    .await;
            }
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Consistent snapshot of a session, if present
    pub async fn get(&self, key: SessionKey) -> Option<SessionSnapshot> {
        let sessions = self.sessions.read().await;
        sessions.get(&key).map(|s| s.snapshot())
    }

    /// Whether the session under this key has a live transport
    pub async fn is_active(&self, key: SessionKey) -> bool {
        let sessions = self.sessions.read().await;
        sessions.get(&key).map(|s| s.is_active()).unwrap_or(false)
    }

    /// Snapshots of all sessions (for status surfaces)
    pub async fn list(&self) -> Vec<SessionSnapshot> {
        let sessions = self.sessions.read().await;
        sessions.values().map(|s| s.snapshot()).collect()
    }

    /// Count of sessions with a live transport
    pub async fn active_count(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.values().filter(|s| s.is_active()).count()
    }

    // ========================================================================
    // Event consumption (one task per session)
    // ========================================================================

    /// Consume the transport's event stream for one session
    ///
    /// This task is the only writer of the session's content. The key it
    /// holds is updated in place on identity resolution, so fragments racing
    /// the rekey land on the same logical session in event order.
    async fn consume(self, mut key: SessionKey, mut stream: EventStream, callbacks: StartCallbacks) {
        while let Some(event) = stream.next().await {
            match event {
                StreamEvent::Fragment(text) => {
                    let applied = {
                        let mut sessions = self.sessions.write().await;
                        sessions
                            .get_mut(&key)
                            .map(|s| s.append(&text))
                            .unwrap_or(false)
                    };
                    if applied {
                        let _ = self.notices.send(SessionNotice::Updated { key });
                    }
                }

                StreamEvent::SubtaskResolved(subtask_id) => {
                    let applied = {
                        let mut sessions = self.sessions.write().await;
                        sessions
                            .get_mut(&key)
                            .map(|s| s.set_subtask(subtask_id))
                            .unwrap_or(false)
                    };
                    if applied {
                        let _ = self.notices.send(SessionNotice::Updated { key });
                    }
                }

                StreamEvent::IdentityResolved(task_id) => {
                    let rekeyed = {
                        let mut sessions = self.sessions.write().await;
                        identity::rekey(&mut sessions, key, task_id)
                    };
                    if let Some(new_key) = rekeyed {
                        let _ = self.notices.send(SessionNotice::Resolved {
                            from: key,
                            to: new_key,
                        });
                        key = new_key;
                        callbacks.notify_identity(task_id);
                    }
                }

                StreamEvent::Complete {
                    task_id,
                    subtask_id,
                } => {
                    let (rekeyed, completed, final_subtask) = {
                        let mut sessions = self.sessions.write().await;

                        // A completion for a still-provisional session carries
                        // the durable id; resolve before completing.
                        let rekeyed = if key.is_provisional() {
                            identity::rekey(&mut sessions, key, task_id)
                        } else {
                            None
                        };
                        let effective = rekeyed.unwrap_or(key);

                        match sessions.get_mut(&effective) {
                            Some(session) => {
                                let completed = session.complete(subtask_id);
                                (rekeyed, completed, session.subtask())
                            }
                            None => (rekeyed, false, subtask_id),
                        }
                    };

                    if let Some(new_key) = rekeyed {
                        let _ = self.notices.send(SessionNotice::Resolved {
                            from: key,
                            to: new_key,
                        });
                        key = new_key;
                        callbacks.notify_identity(task_id);
                    }
                    if completed {
                        let _ = self.notices.send(SessionNotice::Terminated {
                            key,
                            state: SessionState::Completed,
                        });
                        callbacks.notify_complete(task_id, final_subtask);
                        info!(%key, "Session completed");
                    }
                }

                StreamEvent::Error(transport_err) => {
                    self.apply_failure(key, transport_err, &callbacks).await;
                }
            }
        }

        // Transport streams end with a terminal event; a bare end means the
        // connection died without one.
        let still_live = {
            let sessions = self.sessions.read().await;
            sessions.get(&key).map(|s| !s.is_terminal()).unwrap_or(false)
        };
        if still_live {
            self.apply_failure(
                key,
                TransportError::Dropped("stream ended without a terminal event".to_string()),
                &callbacks,
            )
            .await;
        }
    }

    /// Fail a session from a transport error, honoring the stop status
    async fn apply_failure(
        &self,
        key: SessionKey,
        transport_err: TransportError,
        callbacks: &StartCallbacks,
    ) {
        let outcome = {
            let mut sessions = self.sessions.write().await;
            sessions.get_mut(&key).map(|session| {
                let stopping = session.state() == SessionState::Stopping;
                let error = StreamError::from_transport(transport_err, stopping);
                (session.fail(error.clone()), error)
            })
        };

        if let Some((true, error)) = outcome {
            let _ = self.notices.send(SessionNotice::Terminated {
                key,
                state: SessionState::Failed,
            });
            callbacks.notify_error(&error);
            warn!(%key, %error, "Session failed");
        }
    }

    /// Force a live session to `Failed` (stop timeout, shutdown stragglers)
    async fn force_fail(&self, key: SessionKey, error: StreamError) -> Result<SessionState> {
        let outcome = {
            let mut sessions = self.sessions.write().await;
            sessions
                .get_mut(&key)
                .map(|session| (session.fail(error), session.state()))
        };

        match outcome {
            Some((failed, state)) => {
                if failed {
                    let _ = self.notices.send(SessionNotice::Terminated { key, state });
                }
                Ok(state)
            }
            None => Err(Error::NotFound(key.to_string())),
        }
    }
}

/// Wait until the watched state turns terminal
async fn wait_for_terminal(mut rx: watch::Receiver<SessionState>) -> SessionState {
    loop {
        let state = *rx.borrow_and_update();
        if state.is_terminal() {
            return state;
        }
        if rx.changed().await.is_err() {
            // Sender gone (session removed); report the last seen state
            return *rx.borrow();
        }
    }
}
