//! Background expiry of old event records.
//!
//! The `RetentionSweeper` runs as a tokio task, deleting every record whose
//! `created_at` is strictly older than `now - retention` once on start and
//! then on a fixed interval.

use std::sync::Arc;
use std::time::Duration;

use changefeed_core::clock::Clock;
use changefeed_core::config::DEFAULT_SWEEP_INTERVAL_MS;
use changefeed_core::error::DomainError;
use changefeed_core::query::Filter;
use changefeed_core::store::EventStore;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Deletes event records older than the retention window.
pub struct RetentionSweeper {
    store: Arc<dyn EventStore>,
    clock: Arc<dyn Clock>,
    retention: Duration,
    interval: Duration,
}

impl RetentionSweeper {
    /// Create a sweeper with the default five-minute interval.
    #[must_use]
    pub fn new(store: Arc<dyn EventStore>, clock: Arc<dyn Clock>, retention: Duration) -> Self {
        Self {
            store,
            clock,
            retention,
            interval: Duration::from_millis(DEFAULT_SWEEP_INTERVAL_MS),
        }
    }

    /// Set a custom sweep interval.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run one sweep, returning the number of deleted records.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the retention window does not
    /// fit a timestamp offset, or the store's error if the delete fails.
    pub async fn run_once(&self) -> Result<u64, DomainError> {
        let retention = chrono::Duration::from_std(self.retention)
            .map_err(|e| DomainError::Validation(format!("retention out of range: {e}")))?;
        let cutoff = self
            .clock
            .now()
            .checked_sub_signed(retention)
            .ok_or_else(|| {
                DomainError::Validation(format!(
                    "retention of {:?} reaches before the earliest timestamp",
                    self.retention
                ))
            })?;
        self.store.delete(&Filter::CreatedBefore(cutoff)).await
    }

    async fn sweep(&self) {
        match self.run_once().await {
            Ok(0) => debug!("retention sweep found nothing to delete"),
            Ok(deleted) => info!(deleted, "cleaned up old events"),
            Err(e) => error!(error = %e, "retention sweep failed"),
        }
    }

    /// Spawn the sweeper as a background task. The first sweep runs
    /// immediately.
    #[must_use = "dropping the handle stops the sweeper"]
    pub fn start(self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        info!(
            retention = ?self.retention,
            interval = ?self.interval,
            "retention sweeper started"
        );

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => self.sweep().await,
                }
            }

            debug!("retention sweeper stopped");
        });

        SweeperHandle {
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }
}

/// Owned handle to a running sweeper. Dropping it aborts the task.
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for an in-flight sweep to finish. No sweep
    /// starts after this returns.
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "retention sweeper task ended abnormally");
                }
            }
        }
    }

    /// Returns whether the background task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
