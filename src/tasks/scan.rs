//! Expiration Scan Task
//!
//! Background task that periodically evicts entries with expired lazy triggers
//! and forgets invalidation tags no entry carries any more.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::api::AppState;

/// Spawns a background task that periodically sweeps the server state.
///
/// Each pass polls the lazy triggers of every cached entry, evicts the
/// expired ones, then prunes unused tags. Active triggers are not polled;
/// they evict their entries themselves.
///
/// # Arguments
/// * `state` - Shared application state
/// * `scan_interval_secs` - Interval in seconds between scans
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
///
/// # Example
/// ```ignore
/// let state = AppState::new(MemoryCache::new());
/// let scan_handle = spawn_scan_task(state.clone(), 1);
/// // Later, during shutdown:
/// scan_handle.abort();
/// ```
pub fn spawn_scan_task(state: AppState, scan_interval_secs: u64) -> JoinHandle<()> {
    spawn_scan_task_every(state, Duration::from_secs(scan_interval_secs))
}

/// Same as [`spawn_scan_task`] with an arbitrary interval.
pub fn spawn_scan_task_every(state: AppState, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Starting expiration scan task with interval of {:?}",
            interval
        );

        loop {
            // Sleep for the configured interval
            tokio::time::sleep(interval).await;

            let (removed, pruned) = state.sweep();

            // Log scan statistics
            if removed > 0 || pruned > 0 {
                info!(
                    "Expiration scan: removed {} expired entries, pruned {} tags",
                    removed, pruned
                );
            } else {
                debug!("Expiration scan: nothing to remove");
            }
        }
    })
}
