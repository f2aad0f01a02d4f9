//! Periodic expectation cleanup.
//!
//! Registrations are only removed by a check that resolves them. A resource
//! that is deleted, or never reconciled again, would otherwise keep its
//! registration forever. The cleanup task scans the registry on an interval
//! and drops registrations whose resource is gone from the local cache or
//! whose timeout plus a grace period has passed.

use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use helmsman_core::{ExpectationCleanerConfig, ResourcePresence};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use super::manager::{ExpectationManager, StaleReason};

// ============================================================================
// METRICS
// ============================================================================

/// Counters for expectation cleanup.
#[derive(Debug, Default)]
pub struct ExpectationCleanupMetrics {
    /// Total cleanup cycles completed
    pub cleanup_cycles: AtomicU64,

    /// Registrations dropped because the resource no longer exists
    pub removed_missing: AtomicU64,

    /// Registrations dropped because timeout plus grace elapsed
    pub removed_expired: AtomicU64,
}

impl ExpectationCleanupMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current snapshot of all metrics.
    pub fn snapshot(&self) -> ExpectationCleanupSnapshot {
        ExpectationCleanupSnapshot {
            cleanup_cycles: self.cleanup_cycles.load(Ordering::Relaxed),
            removed_missing: self.removed_missing.load(Ordering::Relaxed),
            removed_expired: self.removed_expired.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of cleanup metrics at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpectationCleanupSnapshot {
    pub cleanup_cycles: u64,
    pub removed_missing: u64,
    pub removed_expired: u64,
}

impl ExpectationCleanupSnapshot {
    pub fn total_removed(&self) -> u64 {
        self.removed_missing + self.removed_expired
    }
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Background task that periodically drops stale expectations.
///
/// Runs until `true` is sent on `shutdown_rx` or the sender is dropped.
/// Returns the metrics it updated.
///
/// # Example
///
/// ```ignore
/// let (shutdown_tx, shutdown_rx) = watch::channel(false);
/// let handle = tokio::spawn(expectation_cleanup_task(
///     Arc::clone(&manager),
///     presence,
///     ExpectationCleanerConfig::default(),
///     Arc::new(ExpectationCleanupMetrics::new()),
///     shutdown_rx,
/// ));
///
/// let _ = shutdown_tx.send(true);
/// let metrics = handle.await?;
/// ```
pub async fn expectation_cleanup_task<P, C>(
    manager: Arc<ExpectationManager<P, C>>,
    presence: Arc<dyn ResourcePresence>,
    config: ExpectationCleanerConfig,
    metrics: Arc<ExpectationCleanupMetrics>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<ExpectationCleanupMetrics> {
    let period = config.check_interval().max(Duration::from_millis(1));
    let mut cleanup_interval = interval(period);
    cleanup_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        check_interval_ms = period.as_millis() as u64,
        grace_period_ms = config.grace_period_ms,
        "Expectation cleanup task started"
    );

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::info!("Expectation cleanup task shutting down");
                    break;
                }
            }

            _ = cleanup_interval.tick() => {
                cleanup_expectations(&manager, presence.as_ref(), &config, &metrics);
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        cleanup_cycles = snapshot.cleanup_cycles,
        removed_missing = snapshot.removed_missing,
        removed_expired = snapshot.removed_expired,
        "Expectation cleanup task completed"
    );

    metrics
}

/// Perform one cleanup cycle.
fn cleanup_expectations<P, C>(
    manager: &ExpectationManager<P, C>,
    presence: &dyn ResourcePresence,
    config: &ExpectationCleanerConfig,
    metrics: &ExpectationCleanupMetrics,
) {
    metrics.cleanup_cycles.fetch_add(1, Ordering::Relaxed);

    let removed = manager.remove_stale(presence, config.grace_period());
    if removed.is_empty() {
        tracing::trace!("Expectation cleanup cycle completed with nothing to remove");
        return;
    }

    for (id, reason) in &removed {
        let counter = match reason {
            StaleReason::Missing => &metrics.removed_missing,
            StaleReason::Expired => &metrics.removed_expired,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        if config.log_removals {
            tracing::debug!(resource = %id, ?reason, "Removed stale expectation");
        }
    }
    tracing::info!(
        removed = removed.len(),
        remaining = manager.len(),
        "Expectation cleanup cycle completed"
    );
}

// ============================================================================
// MANAGER WITH CLEANER
// ============================================================================

/// An [`ExpectationManager`] paired with a running cleanup task.
///
/// Dereferences to the manager. Dropping it signals the task to stop.
pub struct PeriodicCleanerExpectationManager<P, C> {
    manager: Arc<ExpectationManager<P, C>>,
    metrics: Arc<ExpectationCleanupMetrics>,
    shutdown_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<Arc<ExpectationCleanupMetrics>>>,
}

impl<P, C> PeriodicCleanerExpectationManager<P, C>
where
    P: 'static,
    C: 'static,
{
    /// Spawn the cleanup task on the current tokio runtime.
    pub fn start(
        manager: Arc<ExpectationManager<P, C>>,
        presence: Arc<dyn ResourcePresence>,
        config: ExpectationCleanerConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let metrics = Arc::new(ExpectationCleanupMetrics::new());
        let handle = tokio::spawn(expectation_cleanup_task(
            Arc::clone(&manager),
            presence,
            config,
            Arc::clone(&metrics),
            shutdown_rx,
        ));
        Self {
            manager,
            metrics,
            shutdown_tx,
            handle: Some(handle),
        }
    }
}

impl<P, C> PeriodicCleanerExpectationManager<P, C> {
    pub fn manager(&self) -> &Arc<ExpectationManager<P, C>> {
        &self.manager
    }

    pub fn metrics(&self) -> ExpectationCleanupSnapshot {
        self.metrics.snapshot()
    }

    /// Signal the cleanup task to stop without waiting for it.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Stop the cleanup task and wait for it to finish.
    pub async fn shutdown(mut self) -> ExpectationCleanupSnapshot {
        self.stop();
        let Some(handle) = self.handle.take() else {
            return self.metrics.snapshot();
        };
        match handle.await {
            Ok(metrics) => metrics.snapshot(),
            Err(e) => {
                tracing::warn!(error = %e, "Expectation cleanup task did not finish cleanly");
                self.metrics.snapshot()
            }
        }
    }
}

impl<P, C> Deref for PeriodicCleanerExpectationManager<P, C> {
    type Target = ExpectationManager<P, C>;

    fn deref(&self) -> &Self::Target {
        &self.manager
    }
}

impl<P, C> Drop for PeriodicCleanerExpectationManager<P, C> {
    fn drop(&mut self) {
        self.stop();
    }
}
