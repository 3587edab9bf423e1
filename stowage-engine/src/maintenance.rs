//! Periodic retention: expired cache entries, stale metrics and sync items
//! that ran out of retries.
//!
//! Each task in a cycle runs on its own; a failing task is logged and
//! reported, and the remaining tasks still run.

use crate::cache::CacheManager;
use crate::collections::PERFORMANCE_METRICS;
use crate::config::MaintenanceConfig;
use crate::error::EngineResult;
use serde::Serialize;
use std::fmt;
use stowage_storage::{KeyRange, QueryOptions, Storage};
use stowage_sync::SyncQueue;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Result of one maintenance task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    Removed { count: usize },
    Failed { error: String },
}

impl TaskOutcome {
    fn from_result(task: &str, result: EngineResult<usize>) -> Self {
        match result {
            Ok(count) => TaskOutcome::Removed { count },
            Err(e) => {
                error!("maintenance task {task} failed: {e}");
                TaskOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    pub fn removed(&self) -> Option<usize> {
        match self {
            TaskOutcome::Removed { count } => Some(*count),
            TaskOutcome::Failed { .. } => None,
        }
    }
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskOutcome::Removed { count } => write!(f, "{count} removed"),
            TaskOutcome::Failed { error } => write!(f, "failed ({error})"),
        }
    }
}

/// Per-task results of one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    pub expired_cache: TaskOutcome,
    pub stale_metrics: TaskOutcome,
    pub exhausted_sync_items: TaskOutcome,
}

impl MaintenanceReport {
    pub fn all_succeeded(&self) -> bool {
        [&self.expired_cache, &self.stale_metrics, &self.exhausted_sync_items]
            .iter()
            .all(|t| t.removed().is_some())
    }
}

/// Runs maintenance cycles against one open store.
#[derive(Debug, Clone)]
pub struct Maintenance {
    storage: Storage,
    config: MaintenanceConfig,
}

impl Maintenance {
    pub fn new(storage: Storage, config: MaintenanceConfig) -> Self {
        Self { storage, config }
    }

    /// Runs every task once.
    pub async fn run_cycle(&self) -> MaintenanceReport {
        let expired_cache = TaskOutcome::from_result(
            "cache sweep",
            CacheManager::new(self.storage.clone()).sweep_expired().await,
        );
        let stale_metrics = TaskOutcome::from_result("metric retention", self.prune_metrics().await);
        let exhausted_sync_items = TaskOutcome::from_result(
            "sync queue pruning",
            SyncQueue::new(self.storage.clone())
                .prune_exhausted(self.config.sync_item_max_age())
                .await
                .map_err(Into::into),
        );

        let report = MaintenanceReport {
            expired_cache,
            stale_metrics,
            exhausted_sync_items,
        };
        info!(
            "Maintenance cycle: cache {}, metrics {}, sync items {}",
            report.expired_cache, report.stale_metrics, report.exhausted_sync_items
        );
        report
    }

    /// Deletes metrics recorded before the retention window.
    async fn prune_metrics(&self) -> EngineResult<usize> {
        let cutoff = self.storage.now().saturating_sub(self.config.metric_retention());
        let pruned = self
            .storage
            .delete_matching(
                PERFORMANCE_METRICS,
                QueryOptions::new()
                    .index("timestamp")
                    .range(KeyRange::upper_bound(cutoff.as_millis(), true)),
            )
            .await?
            .len();
        if pruned > 0 {
            debug!("pruned {pruned} metrics older than {cutoff}");
        }
        Ok(pruned)
    }
}

/// Background task running [`Maintenance::run_cycle`] on an interval.
#[derive(Debug)]
pub(crate) struct Scheduler {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Scheduler {
    /// Starts the timer. The first cycle runs one interval from now.
    pub(crate) fn start(maintenance: Maintenance) -> Self {
        let period = maintenance.config.interval();
        let (shutdown, mut stop) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        maintenance.run_cycle().await;
                    }
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("maintenance scheduler stopped");
        });
        info!("Maintenance scheduled every {}s", period.as_secs());
        Self { shutdown, task }
    }

    /// Signals the task and waits for it to finish its current cycle.
    pub(crate) async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!("maintenance scheduler ended abnormally: {e}");
        }
    }
}
