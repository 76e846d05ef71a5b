//! Core Types - 공용 타입 정의
//!
//! 모든 레이어에서 공통으로 사용하는 타입들

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Identifiers - 식별자
// ============================================================================

/// Durable task identifier assigned by the backend once a task record exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub i64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Identifier of one request/response exchange within a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubtaskId(pub i64);

impl std::fmt::Display for SubtaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "subtask-{}", self.0)
    }
}

/// Client-generated provisional identifier, unique per start attempt
///
/// Used as the session key until the backend assigns a durable [`TaskId`],
/// and sent with the start request so cancellation can target an attempt
/// that has no durable id yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttemptId(pub Uuid);

impl AttemptId {
    /// Generate a new random AttemptId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AttemptId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AttemptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

// ============================================================================
// Start Request - 스트림 시작 요청
// ============================================================================

/// Opaque reference to an uploaded attachment (id + display name, no content)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    /// Backend-side attachment id
    pub id: String,

    /// Display name for the UI
    pub name: String,
}

impl AttachmentRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// The user-submitted input that starts a streaming exchange
///
/// `task_id` present means "continue this existing task"; absent means
/// "create a new task" — the durable id then arrives mid-stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartRequest {
    /// Existing task to continue, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,

    /// User message text
    pub message: String,

    /// Optional attachment reference
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<AttachmentRef>,
}

impl StartRequest {
    /// Create a request that starts a brand-new task
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            task_id: None,
            message: message.into(),
            attachment: None,
        }
    }

    /// Target an existing task
    pub fn with_task(mut self, task_id: TaskId) -> Self {
        self.task_id = Some(task_id);
        self
    }

    /// Attach a file reference
    pub fn with_attachment(mut self, attachment: AttachmentRef) -> Self {
        self.attachment = Some(attachment);
        self
    }
}
