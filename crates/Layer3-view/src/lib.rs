//! # relay-view
//!
//! View coordination adapter for Relay.
//!
//! Given "the task currently on screen", decides which session's state to
//! render. Navigation is pure selection: switching the displayed task never
//! stops, resets, or otherwise affects a session's lifecycle — background
//! streams keep running and re-attach when the user returns.

use relay_foundation::{Result, StartRequest, TaskId};
use relay_session::{
    SessionKey, SessionNotice, SessionRegistry, SessionSnapshot, StartCallbacks,
};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

/// What the screen currently shows plus the draft session, if any
struct ViewState {
    /// Task on screen; `None` is the new-task compose view
    displayed: Option<TaskId>,

    /// Key of a just-started draft session, followed across rekeys
    draft_key: Option<SessionKey>,
}

/// Chooses the session to render for the displayed task
///
/// Construct inside a tokio runtime: the coordinator follows the registry's
/// resolution notices on a background task so a draft session stays attached
/// once it gains its durable id.
#[derive(Clone)]
pub struct ViewCoordinator {
    registry: SessionRegistry,
    state: Arc<RwLock<ViewState>>,
}

impl ViewCoordinator {
    pub fn new(registry: SessionRegistry) -> Self {
        let state = Arc::new(RwLock::new(ViewState {
            displayed: None,
            draft_key: None,
        }));

        let notices = registry.subscribe();
        tokio::spawn(follow_resolutions(notices, Arc::clone(&state)));

        Self { registry, state }
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    /// Switch the displayed task; `None` shows the new-task compose view
    ///
    /// Never touches session lifecycles.
    pub async fn show_task(&self, task: Option<TaskId>) {
        let mut state = self.state.write().await;
        state.displayed = task;
    }

    /// Currently displayed task
    pub async fn displayed(&self) -> Option<TaskId> {
        self.state.read().await.displayed
    }

    // ========================================================================
    // Starting streams
    // ========================================================================

    /// Start a stream for the new-task compose view
    ///
    /// The provisional key is remembered so [`Self::active_view`] can show
    /// the draft before (and after) its identity resolves.
    pub async fn start_draft(
        &self,
        request: StartRequest,
        callbacks: StartCallbacks,
    ) -> Result<SessionKey> {
        let key = self.registry.start(request, callbacks).await?;
        let mut state = self.state.write().await;
        state.draft_key = Some(key);
        debug!(%key, "Draft session started");
        Ok(key)
    }

    /// Start a stream for an existing task
    pub async fn start_for_task(
        &self,
        task_id: TaskId,
        request: StartRequest,
        callbacks: StartCallbacks,
    ) -> Result<SessionKey> {
        self.registry.start(request.with_task(task_id), callbacks).await
    }

    /// Forget the tracked draft (after the caller consumed its result)
    pub async fn clear_draft(&self) {
        let mut state = self.state.write().await;
        state.draft_key = None;
    }

    // ========================================================================
    // Rendering
    // ========================================================================

    /// The session state to render for the current view
    ///
    /// Prefers the session keyed by the displayed task's durable id; with no
    /// such session, falls back to a not-yet-resolved draft that will become
    /// this task. The compose view shows the draft session wherever its key
    /// has moved to.
    pub async fn active_view(&self) -> Option<SessionSnapshot> {
        let (displayed, draft_key) = {
            let state = self.state.read().await;
            (state.displayed, state.draft_key)
        };

        match displayed {
            Some(task) => {
                let durable = SessionKey::Durable(task);
                if let Some(snapshot) = self.registry.get(durable).await {
                    return Some(snapshot);
                }
                match draft_key {
                    Some(key) if key.is_provisional() => self.registry.get(key).await,
                    _ => None,
                }
            }
            None => {
                let key = draft_key?;
                self.registry.get(key).await
            }
        }
    }

    /// Whether the current view has a live stream behind it
    pub async fn is_view_streaming(&self) -> bool {
        self.active_view()
            .await
            .map(|s| s.is_active())
            .unwrap_or(false)
    }
}

/// Keep the draft key pointing at the same logical session across rekeys
async fn follow_resolutions(
    mut notices: broadcast::Receiver<SessionNotice>,
    state: Arc<RwLock<ViewState>>,
) {
    loop {
        match notices.recv().await {
            Ok(SessionNotice::Resolved { from, to }) => {
                let mut state = state.write().await;
                if state.draft_key == Some(from) {
                    debug!(%from, %to, "Draft session resolved");
                    state.draft_key = Some(to);
                }
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "View coordinator lagged behind session notices");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
