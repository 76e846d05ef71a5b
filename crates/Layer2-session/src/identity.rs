//! Identity resolution - provisional → durable rekeying
//!
//! A rename-under-concurrent-access problem: the whole move happens under a
//! single write guard of the registry map, so concurrent readers see either
//! the old mapping or the new one, never neither. Fragments cannot interleave
//! with the rekey because the session's single consumer task applies both in
//! event order.

use crate::key::SessionKey;
use crate::session::StreamSession;
use relay_foundation::TaskId;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Move a session from its provisional key to the durable key, exactly once
///
/// Returns the new key when the session was rekeyed. Ignored (returning
/// `None`) for sessions that are already durably keyed, already resolved,
/// terminal, or absent — all protocol no-ops, never fatal.
pub(crate) fn rekey(
    sessions: &mut HashMap<SessionKey, StreamSession>,
    from: SessionKey,
    task_id: TaskId,
) -> Option<SessionKey> {
    if from.is_durable() {
        debug!(key = %from, "Ignoring identity resolution for durably keyed session");
        return None;
    }

    let to = SessionKey::Durable(task_id);
    if sessions.contains_key(&to) {
        warn!(%from, %to, "Durable key already occupied; ignoring identity resolution");
        return None;
    }

    let mut session = sessions.remove(&from)?;
    if !session.resolve(task_id) {
        sessions.insert(from, session);
        return None;
    }

    sessions.insert(to, session);
    debug!(%from, %to, "Session identity resolved");
    Some(to)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_foundation::StartRequest;
    use tokio_util::sync::CancellationToken;

    fn sessions_with(key: SessionKey) -> HashMap<SessionKey, StreamSession> {
        let request = StartRequest::new("Hello");
        let mut session = StreamSession::new(key, &request, CancellationToken::new());
        session.start();
        session.append("Hel");

        let mut sessions = HashMap::new();
        sessions.insert(key, session);
        sessions
    }

    #[test]
    fn test_rekey_moves_session_with_content() {
        let from = SessionKey::provisional();
        let mut sessions = sessions_with(from);

        let to = rekey(&mut sessions, from, TaskId(42)).unwrap();
        assert_eq!(to, SessionKey::Durable(TaskId(42)));
        assert!(!sessions.contains_key(&from));
        assert_eq!(sessions.get(&to).unwrap().snapshot().content, "Hel");
    }

    #[test]
    fn test_second_resolution_ignored() {
        let from = SessionKey::provisional();
        let mut sessions = sessions_with(from);

        let to = rekey(&mut sessions, from, TaskId(42)).unwrap();
        assert_eq!(rekey(&mut sessions, to, TaskId(43)), None);
        assert!(sessions.contains_key(&to));
        assert!(!sessions.contains_key(&SessionKey::Durable(TaskId(43))));
    }

    #[test]
    fn test_occupied_durable_key_ignored() {
        let from = SessionKey::provisional();
        let mut sessions = sessions_with(from);

        let occupied = SessionKey::Durable(TaskId(42));
        let request = StartRequest::new("other");
        sessions.insert(
            occupied,
            StreamSession::new(occupied, &request, CancellationToken::new()),
        );

        assert_eq!(rekey(&mut sessions, from, TaskId(42)), None);
        // the provisional session stays reachable under its old key
        assert!(sessions.contains_key(&from));
    }

    #[test]
    fn test_absent_session_ignored() {
        let mut sessions = HashMap::new();
        assert_eq!(
            rekey(&mut sessions, SessionKey::provisional(), TaskId(1)),
            None
        );
    }
}
