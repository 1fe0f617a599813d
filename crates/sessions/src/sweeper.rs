//! Idle expiry and capacity eviction.
//!
//! One pass works against a single snapshot of the store:
//!
//! 1. sessions idle past the timeout for their kind are removed at once;
//! 2. if the store is still over `max_open_sessions`, anonymous sessions are
//!    evicted oldest-idle first until it is back at the limit, and only if
//!    anonymous sessions run out are authenticated sessions evicted, down to
//!    `max_open_sessions - release_offset`;
//! 3. the next sleep is the time until the earliest surviving session would
//!    expire, clamped to `[MIN_SLEEP, sleep_ceiling]`.
//!
//! Designer sessions only ever leave by idle timeout.

use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use sk_domain::config::{SessionsConfig, DESIGNER_TIMEOUT_SECS};
use sk_domain::error::{Error, Result};
use sk_domain::trace::TraceEvent;

use crate::cleanup::{CleanupBatch, PendingCleanup};
use crate::session::{Session, SessionKind};
use crate::store::SessionStore;

/// Lower bound on the sweeper's sleep, so it never busy-loops.
pub const MIN_SLEEP: Duration = Duration::from_secs(1);

/// Parameters of a sweep pass.  Cheap to copy out of the manager each pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepSettings {
    pub enabled: bool,
    pub request_timeout_secs: u64,
    pub max_open_sessions: usize,
    pub release_offset: usize,
    pub max_requests_per_second: usize,
}

impl SweepSettings {
    pub fn from_config(config: &SessionsConfig) -> Result<Self> {
        check_request_timeout(config.request_timeout_secs)?;
        if config.max_open_sessions == 0 {
            return Err(Error::Config("max_open_sessions must be > 0".into()));
        }
        if config.max_requests_per_second == 0 {
            return Err(Error::Config("max_requests_per_second must be > 0".into()));
        }
        Ok(Self {
            enabled: config.enabled,
            request_timeout_secs: config.request_timeout_secs,
            max_open_sessions: config.max_open_sessions,
            release_offset: config.effective_release_offset(),
            max_requests_per_second: config.max_requests_per_second,
        })
    }

    /// Idle timeout for a session of `kind`.
    pub fn timeout_for(&self, kind: SessionKind) -> chrono::Duration {
        let secs = match kind {
            SessionKind::Designer => DESIGNER_TIMEOUT_SECS,
            SessionKind::Anonymous | SessionKind::Authenticated => self.request_timeout_secs,
        };
        chrono::Duration::seconds(secs as i64)
    }

    pub fn is_expired(&self, session: &Session, now: DateTime<Utc>) -> bool {
        session.idle_elapsed(now) > self.timeout_for(session.kind())
    }

    /// Upper bound on the sweeper's sleep: how long a full store takes to
    /// turn over at the peak request rate.
    pub fn sleep_ceiling(&self) -> Duration {
        let secs = self.max_open_sessions / self.max_requests_per_second.max(1);
        Duration::from_secs(secs as u64).max(MIN_SLEEP)
    }

    /// Clamp the time until the next expiry into the allowed sleep range.
    pub fn next_sleep(&self, until_next_expiry: Option<Duration>) -> Duration {
        match until_next_expiry {
            Some(d) => d.clamp(MIN_SLEEP, self.sleep_ceiling()),
            None => self.sleep_ceiling(),
        }
    }
}

/// Regular sessions may not outlive designer sessions.
pub fn check_request_timeout(secs: u64) -> Result<()> {
    if secs == 0 {
        return Err(Error::Config("request_timeout_secs must be > 0".into()));
    }
    if secs > DESIGNER_TIMEOUT_SECS {
        return Err(Error::Config(format!(
            "request_timeout_secs {secs} exceeds the designer timeout {DESIGNER_TIMEOUT_SECS}"
        )));
    }
    Ok(())
}

/// Store mutations made by one pass.
#[derive(Debug, Default)]
pub struct SweepOutcome {
    pub scanned: usize,
    pub expired: Vec<String>,
    pub evicted: Vec<String>,
    pub next_sleep: Duration,
}

struct Survivor {
    session: Arc<Session>,
    idle: chrono::Duration,
    remaining: chrono::Duration,
}

/// Run expiry and eviction against `store`, collecting cleanup work into
/// `batch`.
pub fn sweep(
    store: &SessionStore,
    settings: &SweepSettings,
    now: DateTime<Utc>,
    batch: &mut CleanupBatch,
) -> SweepOutcome {
    let snapshot = store.snapshot();
    let mut outcome = SweepOutcome {
        scanned: snapshot.len(),
        ..Default::default()
    };

    let mut survivors = Vec::with_capacity(snapshot.len());
    for session in snapshot {
        let kind = session.kind();
        let idle = session.idle_elapsed(now);
        let threshold = settings.timeout_for(kind);

        if idle > threshold {
            if store.remove_exact(&session) {
                TraceEvent::SessionExpired {
                    session_id: session.id().to_owned(),
                    kind: kind.to_string(),
                    idle_secs: idle.num_seconds(),
                }
                .emit();
                batch.push(cleanup_entry(&session));
                outcome.expired.push(session.id().to_owned());
            }
        } else {
            survivors.push(Survivor {
                session,
                idle,
                remaining: threshold - idle,
            });
        }
    }

    let mut open = store.count();
    if open > settings.max_open_sessions {
        let evicted = evict_for_capacity(store, settings, &survivors, &mut open, batch);
        let gone: HashSet<&str> = evicted.iter().map(String::as_str).collect();
        survivors.retain(|s| !gone.contains(s.session.id()));
        outcome.evicted = evicted;
    }

    let until_next_expiry = survivors
        .iter()
        .map(|s| s.remaining)
        .min()
        .map(|d| d.to_std().unwrap_or(Duration::ZERO));
    outcome.next_sleep = settings.next_sleep(until_next_expiry);

    outcome
}

fn evict_for_capacity(
    store: &SessionStore,
    settings: &SweepSettings,
    survivors: &[Survivor],
    open: &mut usize,
    batch: &mut CleanupBatch,
) -> Vec<String> {
    let mut anonymous = Vec::new();
    let mut authenticated = Vec::new();
    for s in survivors {
        match s.session.kind() {
            SessionKind::Anonymous => anonymous.push(s),
            SessionKind::Authenticated => authenticated.push(s),
            SessionKind::Designer => {}
        }
    }
    anonymous.sort_by_key(|s| Reverse(s.idle));
    authenticated.sort_by_key(|s| Reverse(s.idle));

    tracing::info!(
        open = *open,
        max_open = settings.max_open_sessions,
        anonymous = anonymous.len(),
        authenticated = authenticated.len(),
        "session capacity exceeded, evicting"
    );

    let mut evicted = Vec::new();
    let mut evict = |s: &Survivor| -> bool {
        if !store.remove_exact(&s.session) {
            return false;
        }
        TraceEvent::SessionEvicted {
            session_id: s.session.id().to_owned(),
            kind: s.session.kind().to_string(),
            idle_secs: s.idle.num_seconds(),
        }
        .emit();
        batch.push(cleanup_entry(&s.session));
        evicted.push(s.session.id().to_owned());
        true
    };

    for s in anonymous {
        if *open <= settings.max_open_sessions {
            break;
        }
        if evict(s) {
            *open -= 1;
        }
    }

    if *open > settings.max_open_sessions {
        let target = settings
            .max_open_sessions
            .saturating_sub(settings.release_offset);
        for s in authenticated {
            if *open <= target {
                break;
            }
            if evict(s) {
                *open -= 1;
            }
        }
    }

    if *open > settings.max_open_sessions {
        tracing::warn!(
            open = *open,
            max_open = settings.max_open_sessions,
            "still over capacity after eviction (designer sessions are never evicted)"
        );
    }

    evicted
}

fn cleanup_entry(session: &Session) -> PendingCleanup {
    PendingCleanup {
        session_id: session.id().to_owned(),
        user: session.owner_user(),
        cache_flushed: false,
    }
}
