//! Side effects for removed sessions.
//!
//! Every removed session gets its content cache flushed.  Owner users are
//! force-checked-in once per batch, unless they still hold another live
//! session.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;

use sk_domain::error::Result;

/// External services invoked when sessions go away.  Both calls must be
/// idempotent.
#[async_trait]
pub trait SessionCollaborators: Send + Sync {
    /// Flush cached content belonging to one session.
    async fn invalidate_cache(&self, session_id: &str) -> Result<()>;

    /// Check in all content held by the given users.
    async fn force_checkin(&self, users: &[String]) -> Result<()>;
}

/// Collaborators that only log.  Used when no cache or content store is
/// wired in.
pub struct LoggingCollaborators;

#[async_trait]
impl SessionCollaborators for LoggingCollaborators {
    async fn invalidate_cache(&self, session_id: &str) -> Result<()> {
        tracing::debug!(session_id, "cache invalidated");
        Ok(())
    }

    async fn force_checkin(&self, users: &[String]) -> Result<()> {
        tracing::info!(users = ?users, "forced check-in");
        Ok(())
    }
}

/// A session removed from the store whose cleanup is still outstanding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCleanup {
    pub session_id: String,
    pub user: Option<String>,
    /// Set for explicit releases, which flush the cache inline.
    pub cache_flushed: bool,
}

/// Cleanup work collected during one sweep pass.
#[derive(Debug, Default)]
pub struct CleanupBatch {
    entries: Vec<PendingCleanup>,
    preserved: BTreeSet<String>,
}

impl CleanupBatch {
    pub fn push(&mut self, entry: PendingCleanup) {
        self.entries.push(entry);
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = PendingCleanup>) {
        self.entries.extend(entries);
    }

    /// Keep `user` out of the check-in call: they still have a live session.
    pub fn preserve(&mut self, user: String) {
        self.preserved.insert(user);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Session IDs whose cache still needs flushing.
    pub fn cache_targets(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|e| !e.cache_flushed)
            .map(|e| e.session_id.as_str())
    }

    /// Distinct owner users to check in, sorted.
    pub fn checkin_users(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter_map(|e| e.user.as_ref())
            .filter(|u| !self.preserved.contains(*u))
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// What a dispatch actually did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub caches_flushed: usize,
    pub checked_in: Vec<String>,
}

/// Sends cleanup batches to the collaborators.  Failures are logged and
/// never propagate.
#[derive(Clone)]
pub struct CleanupNotifier {
    collaborators: Arc<dyn SessionCollaborators>,
}

impl CleanupNotifier {
    pub fn new(collaborators: Arc<dyn SessionCollaborators>) -> Self {
        Self { collaborators }
    }

    /// Flush the cache of a single session.  Returns whether it succeeded.
    pub async fn invalidate(&self, session_id: &str) -> bool {
        match self.collaborators.invalidate_cache(session_id).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(session_id, error = %e, "cache invalidation failed");
                false
            }
        }
    }

    pub async fn dispatch(&self, batch: CleanupBatch) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();
        if batch.is_empty() {
            return outcome;
        }

        for session_id in batch.cache_targets() {
            if self.invalidate(session_id).await {
                outcome.caches_flushed += 1;
            }
        }

        let users = batch.checkin_users();
        if !users.is_empty() {
            match self.collaborators.force_checkin(&users).await {
                Ok(()) => outcome.checked_in = users,
                Err(e) => {
                    tracing::warn!(users = ?users, error = %e, "forced check-in failed");
                }
            }
        }

        outcome
    }
}
