//! Advisory lock registry.
//!
//! The manager never blocks a caller: `acquire` returns immediately with
//! either the granted lock or the locks standing in the way.  Callers decide
//! whether to retry, wait, or report the conflict.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use sk_domain::trace::TraceEvent;

use crate::resource::ResourceMask;

/// A lock currently held on one or more resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceLock {
    pub lock_id: u64,
    /// Free-text description of who holds the lock (e.g. `"publisher-job-7"`).
    pub locker: String,
    pub resources: ResourceMask,
    pub created_at: DateTime<Utc>,
}

/// Outcome of [`LockManager::acquire`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquisition {
    Granted(ResourceLock),
    /// Held locks that overlap the requested resources.  Never empty.
    Conflict(Vec<ResourceLock>),
}

impl Acquisition {
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted(_))
    }

    pub fn lock(&self) -> Option<&ResourceLock> {
        match self {
            Self::Granted(lock) => Some(lock),
            Self::Conflict(_) => None,
        }
    }

    pub fn conflicts(&self) -> &[ResourceLock] {
        match self {
            Self::Granted(_) => &[],
            Self::Conflict(locks) => locks,
        }
    }
}

/// Misuse of the lock API.  These indicate a bug in the caller.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    #[error("locker description must not be empty")]
    EmptyLocker,
    #[error("resource mask must not be empty")]
    EmptyMask,
    #[error("unknown resource bits {0:#x}")]
    UnknownResource(u32),
    #[error("expected exactly one resource flag, got {0:#x}")]
    NotSingleResource(u32),
}

/// Display form of a held lock, with resource names resolved.
#[derive(Debug, Clone, Serialize)]
pub struct LockStatus {
    pub lock_id: u64,
    pub locker: String,
    pub resources: Vec<&'static str>,
    pub created_at: DateTime<Utc>,
}

impl From<&ResourceLock> for LockStatus {
    fn from(lock: &ResourceLock) -> Self {
        Self {
            lock_id: lock.lock_id,
            locker: lock.locker.clone(),
            resources: lock.resources.names(),
            created_at: lock.created_at,
        }
    }
}

struct LockTable {
    /// Id handed to the next successful acquisition.
    next_id: u64,
    held: BTreeMap<u64, ResourceLock>,
}

/// In-memory registry of held resource locks.
///
/// For any two held locks `a` and `b`, `a.resources & b.resources` is empty.
pub struct LockManager {
    table: Mutex<LockTable>,
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(LockTable {
                next_id: 1,
                held: BTreeMap::new(),
            }),
        }
    }

    /// Try to lock every resource in `mask` for `locker`.
    ///
    /// Returns [`Acquisition::Conflict`] listing the overlapping locks when
    /// any requested bit is already held.  A conflict consumes no lock id.
    pub fn acquire(
        &self,
        mask: ResourceMask,
        locker: &str,
    ) -> Result<Acquisition, LockError> {
        if locker.trim().is_empty() {
            return Err(LockError::EmptyLocker);
        }
        if mask.is_empty() {
            return Err(LockError::EmptyMask);
        }
        let unknown = mask.unknown_bits();
        if unknown != 0 {
            return Err(LockError::UnknownResource(unknown));
        }

        let outcome = {
            let mut table = self.table.lock();
            let conflicts: Vec<ResourceLock> = table
                .held
                .values()
                .filter(|held| held.resources.intersects(mask))
                .cloned()
                .collect();

            if conflicts.is_empty() {
                let lock = ResourceLock {
                    lock_id: table.next_id,
                    locker: locker.to_owned(),
                    resources: mask,
                    created_at: Utc::now(),
                };
                table.next_id += 1;
                table.held.insert(lock.lock_id, lock.clone());
                Acquisition::Granted(lock)
            } else {
                Acquisition::Conflict(conflicts)
            }
        };

        match &outcome {
            Acquisition::Granted(lock) => {
                tracing::debug!(lock_id = lock.lock_id, locker, resources = %mask, "lock granted");
                TraceEvent::LockAcquired {
                    lock_id: lock.lock_id,
                    locker: locker.to_owned(),
                    resources: names(mask),
                }
                .emit();
            }
            Acquisition::Conflict(conflicts) => {
                tracing::debug!(
                    locker,
                    resources = %mask,
                    conflicts = conflicts.len(),
                    "lock denied"
                );
                TraceEvent::LockDenied {
                    locker: locker.to_owned(),
                    resources: names(mask),
                    conflicts: conflicts.iter().map(|l| l.lock_id).collect(),
                }
                .emit();
            }
        }

        Ok(outcome)
    }

    /// Release a lock.  Returns `false` when nothing was held under `lock_id`.
    pub fn release(&self, lock_id: u64) -> bool {
        let removed = self.table.lock().held.remove(&lock_id);
        match removed {
            Some(lock) => {
                tracing::debug!(lock_id, locker = %lock.locker, "lock released");
                TraceEvent::LockReleased { lock_id }.emit();
                true
            }
            None => false,
        }
    }

    /// Whether the single resource `flag` is currently locked.
    pub fn is_locked(&self, flag: ResourceMask) -> Result<bool, LockError> {
        Ok(self.current_lock(flag)?.is_some())
    }

    /// The lock currently holding the single resource `flag`, if any.
    pub fn current_lock(
        &self,
        flag: ResourceMask,
    ) -> Result<Option<ResourceLock>, LockError> {
        check_single(flag)?;
        Ok(self
            .table
            .lock()
            .held
            .values()
            .find(|held| held.resources.intersects(flag))
            .cloned())
    }

    /// Snapshot of every held lock, ordered by lock id.
    pub fn all_locks(&self) -> Vec<ResourceLock> {
        self.table.lock().held.values().cloned().collect()
    }

    /// Display snapshot of every held lock.
    pub fn status(&self) -> Vec<LockStatus> {
        self.table
            .lock()
            .held
            .values()
            .map(LockStatus::from)
            .collect()
    }

    /// Locks created more than `max_age` before `now`.
    pub fn stale_locks(
        &self,
        now: DateTime<Utc>,
        max_age: chrono::Duration,
    ) -> Vec<ResourceLock> {
        self.table
            .lock()
            .held
            .values()
            .filter(|held| now.signed_duration_since(held.created_at) > max_age)
            .cloned()
            .collect()
    }

    /// Number of held locks.
    pub fn len(&self) -> usize {
        self.table.lock().held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn check_single(flag: ResourceMask) -> Result<(), LockError> {
    let unknown = flag.unknown_bits();
    if unknown != 0 {
        return Err(LockError::UnknownResource(unknown));
    }
    if !flag.is_single_resource() {
        return Err(LockError::NotSingleResource(flag.bits()));
    }
    Ok(())
}

fn names(mask: ResourceMask) -> Vec<String> {
    mask.names().into_iter().map(str::to_owned).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disjoint_masks_both_granted() {
        let mgr = LockManager::new();
        let a = mgr.acquire(ResourceMask::PUBLISH, "a").unwrap();
        let b = mgr.acquire(ResourceMask::IMPORT | ResourceMask::EXPORT, "b").unwrap();
        assert!(a.is_granted());
        assert!(b.is_granted());
        assert_eq!(mgr.len(), 2);
    }

    #[test]
    fn overlapping_mask_reports_holder() {
        let mgr = LockManager::new();
        let first = mgr
            .acquire(ResourceMask::PUBLISH | ResourceMask::REINDEX, "a")
            .unwrap();
        let second = mgr
            .acquire(ResourceMask::REINDEX | ResourceMask::EXPORT, "b")
            .unwrap();

        assert!(!second.is_granted());
        assert!(second.lock().is_none());
        assert_eq!(second.conflicts(), &[first.lock().unwrap().clone()]);
        // The denied request left nothing behind.
        assert!(!mgr.is_locked(ResourceMask::EXPORT).unwrap());
    }

    #[test]
    fn conflict_does_not_consume_an_id() {
        let mgr = LockManager::new();
        let a = mgr.acquire(ResourceMask::PUBLISH, "a").unwrap();
        mgr.acquire(ResourceMask::PUBLISH, "b").unwrap();
        mgr.acquire(ResourceMask::PUBLISH, "c").unwrap();
        let d = mgr.acquire(ResourceMask::IMPORT, "d").unwrap();
        assert_eq!(a.lock().unwrap().lock_id, 1);
        assert_eq!(d.lock().unwrap().lock_id, 2);
    }

    #[test]
    fn ids_are_not_reused_after_release() {
        let mgr = LockManager::new();
        let a = mgr.acquire(ResourceMask::PUBLISH, "a").unwrap();
        assert!(mgr.release(a.lock().unwrap().lock_id));
        let b = mgr.acquire(ResourceMask::PUBLISH, "b").unwrap();
        assert!(b.lock().unwrap().lock_id > a.lock().unwrap().lock_id);
    }

    #[test]
    fn release_is_idempotent() {
        let mgr = LockManager::new();
        let id = mgr
            .acquire(ResourceMask::MAINTENANCE, "ops")
            .unwrap()
            .lock()
            .unwrap()
            .lock_id;
        assert!(mgr.release(id));
        assert!(!mgr.release(id));
        assert!(!mgr.release(9_999));
    }

    #[test]
    fn empty_locker_is_rejected() {
        let mgr = LockManager::new();
        assert_eq!(
            mgr.acquire(ResourceMask::PUBLISH, "  ").unwrap_err(),
            LockError::EmptyLocker
        );
    }

    #[test]
    fn bad_masks_are_rejected() {
        let mgr = LockManager::new();
        assert_eq!(
            mgr.acquire(ResourceMask::EMPTY, "a").unwrap_err(),
            LockError::EmptyMask
        );
        assert_eq!(
            mgr.acquire(ResourceMask::from_bits(0x200), "a").unwrap_err(),
            LockError::UnknownResource(0x200)
        );
        assert!(mgr.is_empty());
    }

    #[test]
    fn queries_require_a_single_known_flag() {
        let mgr = LockManager::new();
        assert_eq!(
            mgr.is_locked(ResourceMask::from_bits(0x400)).unwrap_err(),
            LockError::UnknownResource(0x400)
        );
        assert_eq!(
            mgr.current_lock(ResourceMask::PUBLISH | ResourceMask::IMPORT)
                .unwrap_err(),
            LockError::NotSingleResource(0x03)
        );
        assert_eq!(
            mgr.is_locked(ResourceMask::EMPTY).unwrap_err(),
            LockError::NotSingleResource(0)
        );
    }

    #[test]
    fn current_lock_finds_multi_resource_holder() {
        let mgr = LockManager::new();
        mgr.acquire(ResourceMask::IMPORT | ResourceMask::EXPORT, "sync")
            .unwrap();
        let holder = mgr.current_lock(ResourceMask::EXPORT).unwrap().unwrap();
        assert_eq!(holder.locker, "sync");
        assert!(mgr.current_lock(ResourceMask::PUBLISH).unwrap().is_none());
    }

    #[test]
    fn status_resolves_names() {
        let mgr = LockManager::new();
        mgr.acquire(ResourceMask::PUBLISH | ResourceMask::MAINTENANCE, "ops")
            .unwrap();
        let status = mgr.status();
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].resources, vec!["publish", "maintenance"]);

        let json = serde_json::to_value(&status[0]).unwrap();
        assert_eq!(json["locker"], "ops");
        assert_eq!(json["lock_id"], 1);
    }

    #[test]
    fn stale_locks_filters_by_age() {
        let mgr = LockManager::new();
        mgr.acquire(ResourceMask::PUBLISH, "old").unwrap();
        let later = Utc::now() + chrono::Duration::hours(2);
        assert_eq!(mgr.stale_locks(later, chrono::Duration::hours(1)).len(), 1);
        assert!(mgr
            .stale_locks(Utc::now(), chrono::Duration::hours(1))
            .is_empty());
    }
}
