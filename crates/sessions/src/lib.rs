//! Session lifecycle management for SessionKeeper.
//!
//! Keeps the set of live client sessions within its idle-timeout and
//! capacity bounds.  A single background sweeper expires idle sessions,
//! evicts anonymous (then authenticated) sessions under capacity pressure,
//! and hands removed sessions to the cleanup collaborators in one batch per
//! pass.

pub mod cleanup;
pub mod manager;
pub mod session;
pub mod status;
pub mod store;
pub mod sweeper;

pub use cleanup::{CleanupNotifier, LoggingCollaborators, SessionCollaborators};
pub use manager::{SessionManager, SweepReport};
pub use session::{ConnectionKind, Session, SessionKind};
pub use status::{SessionDetail, SessionStatus};
pub use store::SessionStore;
pub use sweeper::SweepSettings;
