//! Service construction and background task wiring.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use sk_domain::config::Config;
use sk_locks::LockManager;
use sk_sessions::{LoggingCollaborators, SessionCollaborators, SessionManager};

/// Shared handles to the long-lived services.
#[derive(Clone)]
pub struct Services {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionManager>,
    pub locks: Arc<LockManager>,
}

/// Build the services from `config`, using the logging collaborators for
/// session cleanup.
pub fn build_services(config: Arc<Config>) -> anyhow::Result<Services> {
    build_services_with(config, Arc::new(LoggingCollaborators))
}

pub fn build_services_with(
    config: Arc<Config>,
    collaborators: Arc<dyn SessionCollaborators>,
) -> anyhow::Result<Services> {
    let sessions = SessionManager::new(&config.sessions, collaborators)?;
    Ok(Services {
        config,
        sessions: Arc::new(sessions),
        locks: Arc::new(LockManager::new()),
    })
}

/// Start the session sweeper and the periodic status reporter.
///
/// Call [`shutdown`] with the same token to stop both.
pub fn start_background_tasks(
    services: &Services,
    shutdown: &CancellationToken,
) -> anyhow::Result<JoinHandle<()>> {
    services.sessions.start()?;

    let services = services.clone();
    let shutdown = shutdown.clone();
    let interval_secs = services.config.observability.status_interval_secs.max(1);

    let reporter = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => report_status(&services),
                _ = shutdown.cancelled() => break,
            }
        }
    });

    tracing::info!("background tasks started");
    Ok(reporter)
}

/// Log one status line for sessions and locks, warning about stale locks.
pub fn report_status(services: &Services) {
    let status = services.sessions.status(false);
    tracing::info!(
        open = status.open,
        anonymous = status.anonymous,
        authenticated = status.authenticated,
        designer = status.designer,
        sweeper_running = status.sweeper_running,
        locks = services.locks.len(),
        "status"
    );

    let max_age = chrono::Duration::seconds(services.config.locks.stale_after_secs as i64);
    for lock in services.locks.stale_locks(chrono::Utc::now(), max_age) {
        tracing::warn!(
            lock_id = lock.lock_id,
            locker = %lock.locker,
            resources = %lock.resources,
            created_at = %lock.created_at,
            "resource lock held for a long time"
        );
    }
}

/// Stop background work and release the session store.
pub async fn shutdown(
    services: &Services,
    token: &CancellationToken,
    reporter: JoinHandle<()>,
) {
    token.cancel();
    if let Err(e) = reporter.await {
        tracing::warn!(error = %e, "status reporter task failed");
    }
    services.sessions.stop().await;

    let held = services.locks.status();
    if !held.is_empty() {
        match serde_json::to_string(&held) {
            Ok(json) => tracing::warn!(locks = %json, "resource locks still held at shutdown"),
            Err(e) => tracing::warn!(error = %e, "failed to serialize lock status"),
        }
    }
}
