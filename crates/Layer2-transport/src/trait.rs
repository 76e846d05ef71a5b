//! Transport trait and stream event types

use crate::error::TransportError;
use futures::Stream;
use relay_foundation::{AttemptId, StartRequest, SubtaskId, TaskId};
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

/// Abstract events a session consumes from one connection
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Incremental piece of response content
    Fragment(String),

    /// Backend assigned the durable task id (new-task flow)
    IdentityResolved(TaskId),

    /// Backend assigned the exchange id within the task
    SubtaskResolved(SubtaskId),

    /// Natural completion; terminal
    Complete {
        task_id: TaskId,
        subtask_id: Option<SubtaskId>,
    },

    /// Connection-level or backend-reported failure; terminal
    Error(TransportError),
}

impl StreamEvent {
    /// Whether the stream ends after this event
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Complete { .. } | StreamEvent::Error(_))
    }
}

/// A boxed, ordered event stream for one connection
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Chunked stream transport
///
/// Implement this trait to back sessions with a concrete connection type.
/// One `open` call corresponds to one connection for one session attempt.
///
/// Contract:
/// - Events are yielded in the order the backend emitted them (FIFO per
///   connection). No ordering is guaranteed across different connections.
/// - The stream ends after the first terminal event (`Complete` or `Error`).
/// - Cancellation is cooperative and best-effort: when `cancel` fires, the
///   transport asks the backend to stop, then keeps draining — a completion
///   racing the cancel may still arrive and wins. If nothing terminal arrives
///   within the transport's cancel-ack bound, the stream must end with
///   `Error(CancelTimeout)` rather than hang.
/// - No automatic reconnection or resend. A dropped connection ends the
///   stream with `Error`; recovery is a fresh `open` by the caller.
pub trait StreamTransport: Send + Sync {
    /// Open one connection for a session attempt
    fn open(
        &self,
        request: StartRequest,
        attempt: AttemptId,
        cancel: CancellationToken,
    ) -> EventStream;
}
