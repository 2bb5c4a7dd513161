//! Session Manager: issues and validates resume tokens with a 5-minute
//! sliding TTL, measured against monotonic time so a system clock step can't
//! extend or shorten a session's life. Owns its own lock, independent of
//! the Room Registry's.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use protocol::{Role, SessionToken, StreamId, UserId};
use uuid::Uuid;

pub const SESSION_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
pub struct Session {
    pub token: SessionToken,
    pub user_id: UserId,
    pub stream_id: StreamId,
    pub role: Role,
    pub queue_position: Option<u32>,
    expires_at: Instant,
}

#[derive(Default)]
pub struct SessionManager {
    sessions: Mutex<HashMap<SessionToken, Session>>,
}

impl SessionManager {
    /// `token = "sess_" + millis + "_" + random"`, using a UUIDv4 for the
    /// random component — the teacher's stack already pulls in `uuid` for
    /// its own correlation ids elsewhere in the pack, so no new crate is
    /// needed for this.
    pub fn create_session(&self, user_id: UserId, stream_id: StreamId, role: Role) -> SessionToken {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let token = format!("sess_{millis}_{}", Uuid::new_v4().simple());
        let session = Session {
            token: token.clone(),
            user_id,
            stream_id,
            role,
            queue_position: None,
            expires_at: Instant::now() + SESSION_TTL,
        };
        self.sessions
            .lock()
            .expect("session lock poisoned")
            .insert(token.clone(), session);
        token
    }

    /// Returns the session if unexpired; expired records are evicted lazily
    /// on the next access that finds them.
    pub fn get_session(&self, token: &str) -> Option<Session> {
        let mut sessions = self.sessions.lock().expect("session lock poisoned");
        match sessions.get(token) {
            Some(session) if session.expires_at > Instant::now() => Some(session.clone()),
            Some(_) => {
                sessions.remove(token);
                None
            }
            None => None,
        }
    }

    /// Extends `expiresAt` by another full TTL from now (sliding renewal on
    /// successful resume) and applies any field patch.
    pub fn renew(&self, token: &str, role: Role, queue_position: Option<u32>) -> Option<Session> {
        let mut sessions = self.sessions.lock().expect("session lock poisoned");
        let session = sessions.get_mut(token)?;
        if session.expires_at <= Instant::now() {
            sessions.remove(token);
            return None;
        }
        session.role = role;
        session.queue_position = queue_position;
        session.expires_at = Instant::now() + SESSION_TTL;
        Some(session.clone())
    }

    pub fn remove(&self, token: &str) {
        self.sessions.lock().expect("session lock poisoned").remove(token);
    }

    /// Background sweep: evicts every expired entry.
    pub fn sweep_expired(&self) -> usize {
        let mut sessions = self.sessions.lock().expect("session lock poisoned");
        let now = Instant::now();
        let before = sessions.len();
        sessions.retain(|_, session| session.expires_at > now);
        before - sessions.len()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.sessions.lock().expect("session lock poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_session_is_retrievable() {
        let manager = SessionManager::default();
        let token = manager.create_session("u1".into(), "r1".into(), Role::Host);
        let session = manager.get_session(&token).expect("session present");
        assert_eq!(session.user_id, "u1");
        assert_eq!(session.role, Role::Host);
    }

    #[test]
    fn unknown_token_returns_none() {
        let manager = SessionManager::default();
        assert!(manager.get_session("sess_nope").is_none());
    }

    #[test]
    fn sweep_removes_expired_entries() {
        let manager = SessionManager::default();
        let token = manager.create_session("u1".into(), "r1".into(), Role::Host);
        {
            let mut sessions = manager.sessions.lock().unwrap();
            sessions.get_mut(&token).unwrap().expires_at = Instant::now() - Duration::from_secs(1);
        }
        let evicted = manager.sweep_expired();
        assert_eq!(evicted, 1);
        assert_eq!(manager.len(), 0);
    }
}
