//! Timer-driven reaper schedule.

use std::sync::Arc;
use std::time::Duration;

use filestore_shared::config::ReaperConfig;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::reaper::Reaper;
use super::repository::FileRepository;
use crate::storage::StoragePort;

/// Runs the orphan and deferred sweeps on independent timers until cancelled.
///
/// The loop only schedules; each tick awaits one sweep to completion, so a
/// sweep never overlaps itself within one process. Errors are logged and the
/// next tick retries.
pub struct ReaperScheduler<R: FileRepository, S: StoragePort> {
    reaper: Arc<Reaper<R, S>>,
    orphan_interval: Duration,
    deferred_interval: Duration,
    shutdown: CancellationToken,
}

impl<R, S> ReaperScheduler<R, S>
where
    R: FileRepository + 'static,
    S: StoragePort + 'static,
{
    /// Create a scheduler from the reaper configuration.
    #[must_use]
    pub fn new(
        reaper: Arc<Reaper<R, S>>,
        config: &ReaperConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            reaper,
            orphan_interval: Duration::from_secs(config.orphan_interval_secs.max(1)),
            deferred_interval: Duration::from_secs(config.deferred_interval_secs.max(1)),
            shutdown,
        }
    }

    /// Run the loop on a background task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run the loop until the shutdown token is cancelled.
    pub async fn run(self) {
        let mut orphans = interval(self.orphan_interval);
        let mut deferred = interval(self.deferred_interval);
        orphans.set_missed_tick_behavior(MissedTickBehavior::Skip);
        deferred.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick of an interval completes immediately.
        orphans.tick().await;
        deferred.tick().await;

        info!(
            orphan_interval_secs = self.orphan_interval.as_secs(),
            deferred_interval_secs = self.deferred_interval.as_secs(),
            "Reaper scheduler started"
        );

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => {
                    info!("Reaper scheduler received shutdown signal");
                    break;
                }
                _ = orphans.tick() => {
                    if let Err(e) = self.reaper.sweep_orphans().await {
                        error!(error = %e, "Orphan sweep failed");
                    }
                }
                _ = deferred.tick() => {
                    if let Err(e) = self.reaper.sweep_deferred().await {
                        error!(error = %e, "Deferred delete sweep failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::memory::InMemoryFileRepository;
    use crate::files::test_support::{FlakyStorage, new_record};
    use crate::files::types::FileStatus;
    use chrono::Utc;
    use filestore_shared::types::TenantId;

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_sweeps_on_tick_and_stops() {
        let repo = Arc::new(InMemoryFileRepository::new());
        let storage = Arc::new(FlakyStorage::new());
        let config = ReaperConfig {
            orphan_interval_secs: 60,
            deferred_interval_secs: 60,
            ..ReaperConfig::default()
        };
        let reaper = Arc::new(Reaper::new(Arc::clone(&repo), storage, &config));

        let tenant = TenantId::new();
        let record = repo.insert(new_record(tenant, 1)).await.unwrap();
        repo.mark_deleting(tenant, record.id, Utc::now()).await.unwrap();

        let shutdown = CancellationToken::new();
        let handle = ReaperScheduler::new(reaper, &config, shutdown.clone()).spawn();

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(repo.get(record.id).unwrap().status, FileStatus::Deleted);

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_scheduler_stops_before_first_tick() {
        let repo = Arc::new(InMemoryFileRepository::new());
        let config = ReaperConfig::default();
        let reaper = Arc::new(Reaper::new(
            Arc::clone(&repo),
            Arc::new(FlakyStorage::new()),
            &config,
        ));

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        ReaperScheduler::new(reaper, &config, shutdown).run().await;
    }
}
