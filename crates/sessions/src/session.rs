//! The session entity.
//!
//! The idle clock is an atomic so the many request threads that touch a
//! session never contend on a lock with the sweeper reading it.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// How a session is treated by the sweeper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Anonymous,
    Authenticated,
    /// Created by a designer/admin connection.  Long idle timeout, never
    /// evicted for capacity.
    Designer,
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => write!(f, "anonymous"),
            Self::Authenticated => write!(f, "authenticated"),
            Self::Designer => write!(f, "designer"),
        }
    }
}

/// The kind of connection a request arrived on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionKind {
    #[default]
    Regular,
    Designer,
}

impl ConnectionKind {
    pub fn is_designer(self) -> bool {
        matches!(self, Self::Designer)
    }
}

/// One client's interaction state.
#[derive(Debug)]
pub struct Session {
    id: String,
    connection: ConnectionKind,
    persistent: bool,
    created_at: DateTime<Utc>,
    /// Milliseconds since the Unix epoch.
    idle_since_ms: AtomicI64,
    owner_user: RwLock<Option<String>>,
}

impl Session {
    pub fn new(id: String, connection: ConnectionKind, persistent: bool) -> Self {
        let now = Utc::now();
        Self {
            id,
            connection,
            persistent,
            created_at: now,
            idle_since_ms: AtomicI64::new(now.timestamp_millis()),
            owner_user: RwLock::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// `false` for transient sessions handed out while sessions are
    /// disabled.  Those are never stored.
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    pub fn kind(&self) -> SessionKind {
        if self.connection.is_designer() {
            SessionKind::Designer
        } else if self.owner_user.read().is_some() {
            SessionKind::Authenticated
        } else {
            SessionKind::Anonymous
        }
    }

    pub fn owner_user(&self) -> Option<String> {
        self.owner_user.read().clone()
    }

    /// Attach the authenticated principal to this session.
    pub fn authenticate(&self, user: impl Into<String>) {
        *self.owner_user.write() = Some(user.into());
    }

    pub fn idle_since(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(self.idle_since_ms.load(Ordering::Acquire))
            .unwrap_or_default()
    }

    /// Reset the idle clock to now.
    pub fn touch(&self) {
        self.touch_at(Utc::now());
    }

    /// Set the idle clock to `at`, never later than now.
    pub fn touch_at(&self, at: DateTime<Utc>) {
        let at = at.min(Utc::now());
        self.idle_since_ms
            .store(at.timestamp_millis(), Ordering::Release);
    }

    /// Time since the last touch, as seen at `now`.
    pub fn idle_elapsed(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.idle_since())
    }
}
