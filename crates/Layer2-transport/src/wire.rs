//! Wire-level event model
//!
//! The backend streams an ordered sequence of tagged JSON events over
//! SSE-style `data:` lines. This module owns the serde shape and the
//! line parser.

use crate::error::TransportError;
use crate::r#trait::StreamEvent;
use relay_foundation::{SubtaskId, TaskId};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One tagged event on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireEvent {
    /// Incremental response content
    Fragment { text: String },

    /// Task record was created; durable id assigned
    IdentityResolved { task_id: TaskId },

    /// Exchange id within the task assigned
    SubtaskResolved { subtask_id: SubtaskId },

    /// Stream finished successfully
    Complete {
        task_id: TaskId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subtask_id: Option<SubtaskId>,
    },

    /// Backend reported a task failure
    Error { message: String },
}

impl From<WireEvent> for StreamEvent {
    fn from(event: WireEvent) -> Self {
        match event {
            WireEvent::Fragment { text } => StreamEvent::Fragment(text),
            WireEvent::IdentityResolved { task_id } => StreamEvent::IdentityResolved(task_id),
            WireEvent::SubtaskResolved { subtask_id } => StreamEvent::SubtaskResolved(subtask_id),
            WireEvent::Complete {
                task_id,
                subtask_id,
            } => StreamEvent::Complete {
                task_id,
                subtask_id,
            },
            WireEvent::Error { message } => StreamEvent::Error(TransportError::Server(message)),
        }
    }
}

/// Parse one SSE line into a wire event
///
/// Non-`data:` lines (comments, event names, keep-alives) are skipped.
/// A malformed `data:` payload is logged and skipped, never fatal to the
/// stream.
pub fn parse_sse_line(line: &str) -> Option<WireEvent> {
    let data = line.strip_prefix("data:")?.trim();
    if data.is_empty() {
        return None;
    }

    match serde_json::from_str(data) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(error = %e, "Skipping malformed stream event");
            None
        }
    }
}
