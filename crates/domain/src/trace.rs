use serde::Serialize;

/// Structured trace events emitted across all SessionKeeper crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionCreated {
        session_id: String,
        kind: String,
        persistent: bool,
        reconnect: bool,
    },
    SessionExpired {
        session_id: String,
        kind: String,
        idle_secs: i64,
    },
    SessionEvicted {
        session_id: String,
        kind: String,
        idle_secs: i64,
    },
    SessionReleased {
        session_id: String,
        user: Option<String>,
    },
    SweepCompleted {
        scanned: usize,
        expired: usize,
        evicted: usize,
        checked_in_users: usize,
        open: usize,
        next_sleep_ms: u64,
    },
    LockAcquired {
        lock_id: u64,
        locker: String,
        resources: Vec<String>,
    },
    LockDenied {
        locker: String,
        resources: Vec<String>,
        conflicts: Vec<u64>,
    },
    LockReleased {
        lock_id: u64,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "sk_event");
    }
}
