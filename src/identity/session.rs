use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::debug;
use uuid::Uuid;

pub type SessionToken = String;

/// Issued bearer session. Holds only the user id; the principal (status,
/// permissions) is resolved against the store at validation time so a
/// pending user or a revoked grant is never served from a stale snapshot.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: SessionToken,
    pub user_id: Uuid,
    pub issued_at: Instant,
    pub expires_at: Instant,
}

#[derive(Default)]
struct SessionTable {
    by_token: HashMap<SessionToken, Session>,
    /// user id -> issued tokens, for whole-user revocation.
    by_user: HashMap<Uuid, HashSet<SessionToken>>,
}

/// In-memory store-backed session issuer and validator.
#[derive(Clone)]
pub struct SessionManager {
    pub ttl: Duration,
    table: Arc<RwLock<SessionTable>>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::with_ttl(Duration::from_secs(180 * 60))
    }
}

impl SessionManager {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self { ttl, table: Arc::new(RwLock::new(SessionTable::default())) }
    }

    pub fn issue(&self, user_id: Uuid) -> Session {
        let now = Instant::now();
        let token = crate::token::new_session_token();
        let sess = Session {
            token: token.clone(),
            user_id,
            issued_at: now,
            expires_at: now + self.ttl,
        };
        let mut table = self.table.write();
        table.by_token.insert(token.clone(), sess.clone());
        table.by_user.entry(user_id).or_default().insert(token);
        debug!(target: "praxis::session", "session.issue user={} ttl_secs={}", user_id, self.ttl.as_secs());
        sess
    }

    /// Resolve a token to its user id. Expired entries are dropped on sight
    /// and treated identically to unknown tokens.
    pub fn validate(&self, token: &str) -> Option<Uuid> {
        let now = Instant::now();
        let expired = {
            let table = self.table.read();
            match table.by_token.get(token) {
                Some(sess) if sess.expires_at > now => return Some(sess.user_id),
                Some(_) => true,
                None => false,
            }
        };
        if expired {
            self.remove(token);
        }
        None
    }

    pub fn logout(&self, token: &str) -> bool {
        self.remove(token)
    }

    /// Drop every session issued to a user. Returns the number removed.
    pub fn revoke_user(&self, user_id: Uuid) -> usize {
        let mut table = self.table.write();
        let Some(tokens) = table.by_user.remove(&user_id) else { return 0 };
        let mut count = 0usize;
        for t in tokens {
            if table.by_token.remove(&t).is_some() {
                count += 1;
            }
        }
        debug!(target: "praxis::session", "session.revoke user={} count={}", user_id, count);
        count
    }

    fn remove(&self, token: &str) -> bool {
        let mut table = self.table.write();
        match table.by_token.remove(token) {
            Some(sess) => {
                if let Some(set) = table.by_user.get_mut(&sess.user_id) {
                    set.remove(token);
                }
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_validate_logout() {
        let sm = SessionManager::default();
        let uid = Uuid::new_v4();
        let sess = sm.issue(uid);
        assert_eq!(sm.validate(&sess.token), Some(uid));
        assert!(sm.logout(&sess.token));
        assert_eq!(sm.validate(&sess.token), None);
        assert!(!sm.logout(&sess.token));
    }

    #[test]
    fn expired_session_is_invalid() {
        let sm = SessionManager::with_ttl(Duration::from_millis(0));
        let sess = sm.issue(Uuid::new_v4());
        assert_eq!(sm.validate(&sess.token), None);
    }

    #[test]
    fn revoke_user_drops_all_sessions() {
        let sm = SessionManager::default();
        let uid = Uuid::new_v4();
        let a = sm.issue(uid);
        let b = sm.issue(uid);
        assert_eq!(sm.revoke_user(uid), 2);
        assert_eq!(sm.validate(&a.token), None);
        assert_eq!(sm.validate(&b.token), None);
    }
}
