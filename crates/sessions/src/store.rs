//! Cookie-bound server-side session store.
//!
//! Sessions are created on first access without a valid cookie and evicted
//! lazily: a housekeeping pass runs inline with session creation, gated by a
//! minimum period, so no background thread is ever needed. Under no traffic
//! stale entries linger until the next request crosses the period boundary,
//! which is fine; an entry is a few hundred bytes.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::authn::AuthnState;

pub const COOKIE_NAME: &str = "sessid";

/// One server-side session.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub authn: AuthnState,
    /// Random token echoed in a header by dashboard RPC calls.
    pub xsrf_token: Option<String>,
    /// Set once the administrator gate accepted credentials.
    pub admin: bool,
}

struct Entry {
    session: Session,
    last_access: DateTime<Utc>,
}

struct Inner {
    sessions: HashMap<String, Entry>,
    last_cleanup: DateTime<Utc>,
}

/// All state behind one mutex; per-session access happens under the same
/// lock via [`SessionStore::with_session`].
pub struct SessionStore {
    inner: Mutex<Inner>,
    lifetime: Duration,
    cleanup_period: Duration,
}

impl SessionStore {
    pub fn new(lifetime: Duration, cleanup_period: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                sessions: HashMap::new(),
                last_cleanup: Utc::now(),
            }),
            lifetime,
            cleanup_period,
        }
    }

    /// Resolve the presented cookie value to a live session id, creating a
    /// fresh session when the cookie is absent or unknown. Returns
    /// `(session_id, created)`.
    pub fn resolve(&self, presented: Option<&str>) -> (String, bool) {
        let now = Utc::now();
        let mut inner = self.inner.lock();

        if let Some(id) = presented {
            if let Some(entry) = inner.sessions.get_mut(id) {
                entry.last_access = now;
                return (id.to_owned(), false);
            }
        }

        // Creation is the moment housekeeping piggybacks on.
        self.maybe_cleanup(&mut inner, now);

        let id = new_session_id();
        inner.sessions.insert(
            id.clone(),
            Entry {
                session: Session::default(),
                last_access: now,
            },
        );
        tracing::debug!(sessions = inner.sessions.len(), "session created");
        (id, true)
    }

    /// Run `f` on the named session under the store lock, updating its
    /// access time. Returns `None` for unknown ids.
    pub fn with_session<T>(&self, id: &str, f: impl FnOnce(&mut Session) -> T) -> Option<T> {
        let mut inner = self.inner.lock();
        let entry = inner.sessions.get_mut(id)?;
        entry.last_access = Utc::now();
        Some(f(&mut entry.session))
    }

    pub fn len(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn maybe_cleanup(&self, inner: &mut Inner, now: DateTime<Utc>) {
        if now - inner.last_cleanup < self.cleanup_period {
            return;
        }
        inner.last_cleanup = now;
        let cutoff = now - self.lifetime;
        let before = inner.sessions.len();
        inner.sessions.retain(|_, entry| entry.last_access >= cutoff);
        let evicted = before - inner.sessions.len();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = inner.sessions.len(), "sessions evicted");
        }
    }

    #[cfg(test)]
    fn backdate(&self, id: &str, by: Duration) {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.sessions.get_mut(id) {
            entry.last_access = entry.last_access - by;
        }
        inner.last_cleanup = inner.last_cleanup - by;
    }
}

/// 128 bits of OS randomness as 32 hex chars.
fn new_session_id() -> String {
    let mut buf = [0u8; 16];
    getrandom::fill(&mut buf).expect("OS random source");
    hex::encode(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SessionStore {
        SessionStore::new(Duration::minutes(30), Duration::minutes(5))
    }

    #[test]
    fn ids_are_32_hex_chars_and_unique() {
        let a = new_session_id();
        let b = new_session_id();
        assert_eq!(a.len(), 32);
        assert!(a.bytes().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn missing_cookie_creates_a_session() {
        let store = store();
        let (id, created) = store.resolve(None);
        assert!(created);
        let (same, created) = store.resolve(Some(&id));
        assert!(!created);
        assert_eq!(same, id);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn unknown_cookie_creates_a_fresh_session() {
        let store = store();
        let (id, created) = store.resolve(Some("feedfacefeedfacefeedfacefeedface"));
        assert!(created);
        assert_ne!(id, "feedfacefeedfacefeedfacefeedface");
    }

    #[test]
    fn session_state_round_trips() {
        let store = store();
        let (id, _) = store.resolve(None);
        store
            .with_session(&id, |s| {
                s.admin = true;
                s.xsrf_token = Some("tok".into());
            })
            .unwrap();
        let admin = store.with_session(&id, |s| s.admin).unwrap();
        assert!(admin);
        assert!(store.with_session("nope", |_| ()).is_none());
    }

    #[test]
    fn stale_sessions_evicted_at_the_next_creation() {
        let store = store();
        let (stale, _) = store.resolve(None);
        let (fresh, _) = store.resolve(None);
        // Age the stale session past the lifetime; the fresh one only a bit.
        store.backdate(&stale, Duration::minutes(31));
        store.backdate(&fresh, Duration::minutes(1));
        // This creation crosses the cleanup-period boundary.
        let _ = store.resolve(None);
        assert!(store.with_session(&stale, |_| ()).is_none(), "stale kept");
        assert!(store.with_session(&fresh, |_| ()).is_some(), "fresh evicted");
    }

    #[test]
    fn cleanup_is_gated_by_the_minimum_period() {
        let store = SessionStore::new(Duration::minutes(30), Duration::minutes(5));
        let (stale, _) = store.resolve(None);
        {
            let mut inner = store.inner.lock();
            inner.sessions.get_mut(&stale).unwrap().last_access =
                Utc::now() - Duration::minutes(31);
            // last_cleanup stays recent: the gate must hold the eviction back.
        }
        let _ = store.resolve(None);
        assert!(
            store.with_session(&stale, |_| ()).is_some(),
            "eviction ran before the period elapsed"
        );
    }
}
