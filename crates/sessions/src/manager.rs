//! The session service.
//!
//! [`SessionManager`] owns the store, the sweep parameters and the sweeper
//! task.  It is built once at startup, shared as `Arc<SessionManager>`, and
//! driven through an explicit `start()` / `stop()` lifecycle.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use sk_domain::config::SessionsConfig;
use sk_domain::error::{Error, Result};
use sk_domain::trace::TraceEvent;

use crate::cleanup::{CleanupBatch, CleanupNotifier, PendingCleanup, SessionCollaborators};
use crate::session::{ConnectionKind, Session};
use crate::status::{SessionDetail, SessionStatus};
use crate::store::SessionStore;
use crate::sweeper::{self, SweepSettings};

/// Summary of one sweep pass.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub scanned: usize,
    pub expired: Vec<String>,
    pub evicted: Vec<String>,
    /// Users passed to the forced check-in collaborator.
    pub checked_in: Vec<String>,
    pub open: usize,
    pub next_sleep: Duration,
}

enum Phase {
    Idle,
    Running {
        shutdown: CancellationToken,
        handle: JoinHandle<()>,
    },
    Stopped,
}

pub struct SessionManager {
    store: SessionStore,
    settings: RwLock<SweepSettings>,
    notifier: CleanupNotifier,
    /// Sessions released since the last pass; folded into its batch.
    released: Mutex<Vec<PendingCleanup>>,
    phase: Mutex<Phase>,
    /// `false` once stopped.  Creators hold the read guard until their
    /// session is stored, so `stop()` clears only after they are done.
    accepting: RwLock<bool>,
    sweeper_alive: AtomicBool,
}

impl SessionManager {
    pub fn new(
        config: &SessionsConfig,
        collaborators: Arc<dyn SessionCollaborators>,
    ) -> Result<Self> {
        let settings = SweepSettings::from_config(config)?;
        tracing::info!(
            enabled = settings.enabled,
            request_timeout_secs = settings.request_timeout_secs,
            max_open_sessions = settings.max_open_sessions,
            release_offset = settings.release_offset,
            "session manager configured"
        );
        Ok(Self {
            store: SessionStore::new(),
            settings: RwLock::new(settings),
            notifier: CleanupNotifier::new(collaborators),
            released: Mutex::new(Vec::new()),
            phase: Mutex::new(Phase::Idle),
            accepting: RwLock::new(true),
            sweeper_alive: AtomicBool::new(false),
        })
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Spawn the sweeper task.  Must be called from within a tokio runtime.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let mut phase = self.phase.lock();
        match *phase {
            Phase::Idle => {}
            Phase::Running { .. } => return Err(Error::AlreadyRunning),
            Phase::Stopped => return Err(Error::NotRunning),
        }

        let shutdown = CancellationToken::new();
        self.sweeper_alive.store(true, Ordering::Release);
        let handle = tokio::spawn(self.clone().sweep_loop(shutdown.clone()));
        *phase = Phase::Running { shutdown, handle };
        Ok(())
    }

    /// Stop the sweeper and drop every session.  Later calls to
    /// [`get_or_create`](Self::get_or_create) fail with [`Error::NotRunning`].
    pub async fn stop(&self) {
        let previous = std::mem::replace(&mut *self.phase.lock(), Phase::Stopped);
        *self.accepting.write() = false;

        let running = match previous {
            Phase::Running { shutdown, handle } => {
                shutdown.cancel();
                Some(handle)
            }
            Phase::Idle | Phase::Stopped => None,
        };

        let cleared = self.store.clear();
        self.released.lock().clear();

        if let Some(handle) = running {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "session sweeper task failed");
            }
        }
        tracing::info!(cleared, "session manager stopped");
    }

    pub fn is_running(&self) -> bool {
        *self.accepting.read()
    }

    async fn sweep_loop(self: Arc<Self>, shutdown: CancellationToken) {
        tracing::info!("session sweeper started");
        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let sleep = match AssertUnwindSafe(self.run_pass(Utc::now()))
                .catch_unwind()
                .await
            {
                Ok(report) => report.next_sleep,
                Err(_) => {
                    tracing::error!("sweep pass panicked, retrying next pass");
                    self.settings.read().sleep_ceiling()
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(sleep) => {}
                _ = shutdown.cancelled() => break,
            }
        }
        self.sweeper_alive.store(false, Ordering::Release);
        tracing::info!("session sweeper stopped");
    }

    // ── Request path ────────────────────────────────────────────────

    /// Resolve the session for a request.
    ///
    /// A live, non-expired `candidate_id` is touched and returned.  Otherwise
    /// a new session is created: under a fresh ID, or under `candidate_id`
    /// itself when a designer reconnects.  The new session is only stored if
    /// sessions are enabled or the request is a designer request; otherwise
    /// it is transient.
    pub fn get_or_create(
        &self,
        candidate_id: Option<&str>,
        connection: ConnectionKind,
    ) -> Result<Arc<Session>> {
        let accepting = self.accepting.read();
        if !*accepting {
            return Err(Error::NotRunning);
        }

        let settings = *self.settings.read();
        let candidate = candidate_id.filter(|id| !id.is_empty());

        if let Some(id) = candidate {
            if let Some(existing) = self.store.get(id) {
                if !settings.is_expired(&existing, Utc::now()) {
                    existing.touch();
                    return Ok(existing);
                }
                self.expire_on_lookup(&existing);
            }
        }

        let reconnect = connection.is_designer() && candidate.is_some();
        let id = match candidate {
            Some(id) if reconnect => id.to_owned(),
            _ => uuid::Uuid::new_v4().to_string(),
        };

        let persistent = settings.enabled || connection.is_designer();
        let mut session = Arc::new(Session::new(id, connection, persistent));
        if persistent {
            session = self.store.insert(session);
        }
        drop(accepting);

        TraceEvent::SessionCreated {
            session_id: session.id().to_owned(),
            kind: session.kind().to_string(),
            persistent,
            reconnect,
        }
        .emit();

        Ok(session)
    }

    fn expire_on_lookup(&self, session: &Arc<Session>) {
        if !self.store.remove_exact(session) {
            return;
        }
        TraceEvent::SessionExpired {
            session_id: session.id().to_owned(),
            kind: session.kind().to_string(),
            idle_secs: session.idle_elapsed(Utc::now()).num_seconds(),
        }
        .emit();
        self.released.lock().push(PendingCleanup {
            session_id: session.id().to_owned(),
            user: session.owner_user(),
            cache_flushed: false,
        });
    }

    /// Reset the idle clock of a session.  Returns `false` if unknown.
    pub fn touch(&self, id: &str) -> bool {
        self.store.touch(id)
    }

    /// Log out: remove the session and flush its cache now.  The owner's
    /// forced check-in happens on the next sweep pass.  Returns `false` if
    /// no such session was held.
    pub async fn release(&self, id: &str) -> bool {
        let Some(session) = self.store.remove(id) else {
            return false;
        };
        let user = session.owner_user();

        self.notifier.invalidate(id).await;
        self.released.lock().push(PendingCleanup {
            session_id: id.to_owned(),
            user: user.clone(),
            cache_flushed: true,
        });

        TraceEvent::SessionReleased {
            session_id: id.to_owned(),
            user,
        }
        .emit();
        true
    }

    // ── Sweeping ────────────────────────────────────────────────────

    /// Run one sweep pass as of `now` and dispatch its cleanup batch.
    pub async fn run_pass(&self, now: DateTime<Utc>) -> SweepReport {
        let settings = *self.settings.read();

        let mut batch = CleanupBatch::default();
        batch.extend(std::mem::take(&mut *self.released.lock()));

        let outcome = sweeper::sweep(&self.store, &settings, now, &mut batch);

        // Users with any session left keep their content checked out.
        if !batch.is_empty() {
            for session in self.store.snapshot() {
                if let Some(user) = session.owner_user() {
                    batch.preserve(user);
                }
            }
        }

        let dispatched = self.notifier.dispatch(batch).await;
        let open = self.store.count();

        TraceEvent::SweepCompleted {
            scanned: outcome.scanned,
            expired: outcome.expired.len(),
            evicted: outcome.evicted.len(),
            checked_in_users: dispatched.checked_in.len(),
            open,
            next_sleep_ms: outcome.next_sleep.as_millis() as u64,
        }
        .emit();

        SweepReport {
            scanned: outcome.scanned,
            expired: outcome.expired,
            evicted: outcome.evicted,
            checked_in: dispatched.checked_in,
            open,
            next_sleep: outcome.next_sleep,
        }
    }

    // ── Configuration & reporting ───────────────────────────────────

    pub fn settings(&self) -> SweepSettings {
        *self.settings.read()
    }

    /// Change the idle timeout for regular sessions.  Takes effect on the
    /// next lookup or sweep pass.
    pub fn set_request_timeout(&self, secs: u64) -> Result<()> {
        sweeper::check_request_timeout(secs)?;
        self.settings.write().request_timeout_secs = secs;
        tracing::info!(request_timeout_secs = secs, "session timeout changed");
        Ok(())
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn status(&self, full: bool) -> SessionStatus {
        let settings = self.settings();
        let counts = self.store.counts_by_kind();
        let sessions = full.then(|| {
            self.store
                .snapshot()
                .iter()
                .map(|s| SessionDetail::from(s.as_ref()))
                .collect::<Vec<_>>()
        });

        SessionStatus {
            enabled: settings.enabled,
            sweeper_running: self.sweeper_alive.load(Ordering::Acquire),
            request_timeout_secs: settings.request_timeout_secs,
            open: counts.anonymous + counts.authenticated + counts.designer,
            anonymous: counts.anonymous,
            authenticated: counts.authenticated,
            designer: counts.designer,
            sessions,
        }
    }
}
