//! Scheduled synchronization loop

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::engine::SyncEngine;

/// Periodic sync supervisor
///
/// One task runs `sync_all`, sleeps the interval, and repeats. If a sync is
/// already in progress when the timer fires, the tick is skipped rather
/// than queued. `stop` cancels cooperatively.
pub struct ScheduledSync {
    engine: Arc<SyncEngine>,
    shutdown_tx: watch::Sender<bool>,
    handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ScheduledSync {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            engine,
            shutdown_tx,
            handle: std::sync::Mutex::new(None),
        }
    }

    /// Spawn the supervisor task
    pub fn start(&self, interval: Duration) {
        let mut handle = self.handle.lock().expect("scheduler lock poisoned");
        if handle.is_some() {
            warn!("Scheduled sync already running");
            return;
        }

        let engine = self.engine.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        *handle = Some(tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "Started scheduled sync");
            loop {
                if engine.is_syncing() {
                    debug!("Sync already in progress, skipping tick");
                } else {
                    match engine.sync_all(false).await {
                        Ok(stats) if stats.has_changes() => {
                            info!(
                                files_added = stats.files_added,
                                files_updated = stats.files_updated,
                                files_deleted = stats.files_deleted,
                                "Scheduled sync detected changes"
                            );
                        }
                        Ok(_) => debug!("Scheduled sync: no changes detected"),
                        Err(e) => warn!(error = %e, "Scheduled sync failed; next tick retries"),
                    }
                }

                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            info!("Scheduled sync stopped");
        }));
    }

    pub fn is_running(&self) -> bool {
        self.handle.lock().expect("scheduler lock poisoned").is_some()
    }

    /// Cooperatively stop the supervisor and wait for it to finish
    pub async fn stop(&self) {
        let handle = { self.handle.lock().expect("scheduler lock poisoned").take() };
        if let Some(handle) = handle {
            let _ = self.shutdown_tx.send(true);
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphClient;

    #[tokio::test]
    async fn test_start_and_stop() {
        let dir = tempfile::TempDir::new().unwrap();
        let engine = Arc::new(SyncEngine::new(GraphClient::in_memory().unwrap(), dir.path()));
        let scheduler = ScheduledSync::new(engine);

        scheduler.start(Duration::from_secs(3600));
        assert!(scheduler.is_running());

        scheduler.stop().await;
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn test_double_start_is_ignored() {
        let dir = tempfile::TempDir::new().unwrap();
        let engine = Arc::new(SyncEngine::new(GraphClient::in_memory().unwrap(), dir.path()));
        let scheduler = ScheduledSync::new(engine);

        scheduler.start(Duration::from_secs(3600));
        scheduler.start(Duration::from_secs(3600));
        assert!(scheduler.is_running());
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_loop_performs_initial_sync() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("python")).unwrap();
        std::fs::write(
            dir.path().join("python/rules.md"),
            "## Exceptions\n\n- Catch specific exceptions, never bare except\n",
        )
        .unwrap();

        let graph = GraphClient::in_memory().unwrap();
        let engine = Arc::new(SyncEngine::new(graph.clone(), dir.path()));
        let scheduler = ScheduledSync::new(engine);

        scheduler.start(Duration::from_secs(3600));
        // The first pass runs immediately on start
        tokio::time::sleep(Duration::from_millis(200)).await;
        scheduler.stop().await;

        assert_eq!(graph.count_standards(false).await.unwrap(), 1);
    }
}
