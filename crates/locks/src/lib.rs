//! Server-wide advisory resource locks.
//!
//! Coarse-grained resources (publishing, import, export, ...) are identified
//! by bit flags so that one caller can claim several of them atomically.  The
//! [`LockManager`] grants a lock only when none of the requested bits are
//! held and otherwise reports the conflicting locks without blocking.

pub mod manager;
pub mod resource;

pub use manager::{Acquisition, LockError, LockManager, LockStatus, ResourceLock};
pub use resource::{Resource, ResourceMask, RESOURCES};
