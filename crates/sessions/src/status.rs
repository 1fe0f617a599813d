use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::session::{Session, SessionKind};

/// Point-in-time view of the session subsystem for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub enabled: bool,
    pub sweeper_running: bool,
    pub request_timeout_secs: u64,
    pub open: usize,
    pub anonymous: usize,
    pub authenticated: usize,
    pub designer: usize,
    /// Only present when a full status was requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sessions: Option<Vec<SessionDetail>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionDetail {
    pub id: String,
    pub kind: SessionKind,
    pub idle_since: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_user: Option<String>,
}

impl From<&Session> for SessionDetail {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id().to_owned(),
            kind: session.kind(),
            idle_since: session.idle_since(),
            owner_user: session.owner_user(),
        }
    }
}
