//! In-memory session store.
//!
//! Maps session IDs to live [`Session`]s.  Every operation takes the map
//! lock for a single short critical section, so callers never need their
//! own locking and a long scan works on a [`SessionStore::snapshot`].

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::session::{Session, SessionKind};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

/// Open sessions broken down by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KindCounts {
    pub anonymous: usize,
    pub authenticated: usize,
    pub designer: usize,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a session by its ID.
    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(id).cloned()
    }

    /// Insert `session` unless its ID is already live.  Returns whichever
    /// session ends up stored under the ID.
    pub fn insert(&self, session: Arc<Session>) -> Arc<Session> {
        self.sessions
            .write()
            .entry(session.id().to_owned())
            .or_insert(session)
            .clone()
    }

    /// Reset the idle clock of a session.  Returns `false` if unknown.
    pub fn touch(&self, id: &str) -> bool {
        match self.sessions.read().get(id) {
            Some(session) => {
                session.touch();
                true
            }
            None => false,
        }
    }

    /// Remove and return a session.
    pub fn remove(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.write().remove(id)
    }

    /// Remove `session` only if it is still the entry stored under its ID.
    pub fn remove_exact(&self, session: &Arc<Session>) -> bool {
        let mut sessions = self.sessions.write();
        match sessions.get(session.id()) {
            Some(current) if Arc::ptr_eq(current, session) => {
                sessions.remove(session.id());
                true
            }
            _ => false,
        }
    }

    /// Handles to every session held at the time of the call.  The sessions
    /// themselves are shared, so their idle clocks keep moving.
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions.read().values().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn counts_by_kind(&self) -> KindCounts {
        let mut counts = KindCounts::default();
        for session in self.sessions.read().values() {
            match session.kind() {
                SessionKind::Anonymous => counts.anonymous += 1,
                SessionKind::Authenticated => counts.authenticated += 1,
                SessionKind::Designer => counts.designer += 1,
            }
        }
        counts
    }

    /// Drop every session.  Returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut sessions = self.sessions.write();
        let n = sessions.len();
        sessions.clear();
        n
    }
}
