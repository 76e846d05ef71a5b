//! Session keys
//!
//! A session is keyed by a client-generated provisional id until the backend
//! assigns a durable task id, then rekeyed exactly once.

use relay_foundation::{AttemptId, TaskId};
use serde::{Deserialize, Serialize};

/// The currently-effective identifier of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKey {
    /// Client-generated, valid until identity resolution
    Provisional(AttemptId),

    /// Backend-assigned durable task identifier
    Durable(TaskId),
}

impl SessionKey {
    /// Allocate a fresh provisional key
    pub fn provisional() -> Self {
        Self::Provisional(AttemptId::new())
    }

    pub fn is_provisional(&self) -> bool {
        matches!(self, Self::Provisional(_))
    }

    pub fn is_durable(&self) -> bool {
        matches!(self, Self::Durable(_))
    }

    /// Durable task id, if resolved
    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            Self::Durable(id) => Some(*id),
            Self::Provisional(_) => None,
        }
    }

    /// Provisional attempt id, if not yet resolved
    pub fn attempt_id(&self) -> Option<AttemptId> {
        match self {
            Self::Provisional(id) => Some(*id),
            Self::Durable(_) => None,
        }
    }
}

impl From<TaskId> for SessionKey {
    fn from(id: TaskId) -> Self {
        Self::Durable(id)
    }
}

impl From<AttemptId> for SessionKey {
    fn from(id: AttemptId) -> Self {
        Self::Provisional(id)
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Provisional(id) => write!(f, "attempt-{}", id),
            Self::Durable(id) => write!(f, "{}", id),
        }
    }
}
