//! Periodic eviction of terminal executions from memory.
//!
//! Terminal records older than the retention window are dropped from the
//! [`ExecutionTable`]; the durable copy in the store is left alone. Each
//! pass snapshots candidate ids under the read lock and then evicts them
//! one at a time, so readers are never blocked for a whole sweep.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use conductor_core::types::Timestamp;
use tokio_util::sync::CancellationToken;

use crate::table::ExecutionTable;

/// Run the retention loop until `cancel` is triggered.
pub async fn run(
    table: Arc<ExecutionTable>,
    retention: Duration,
    interval: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(
        retention_secs = retention.as_secs(),
        interval_secs = interval.as_secs(),
        "Execution retention sweeper started"
    );

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Execution retention sweeper stopping");
                break;
            }
            _ = ticker.tick() => {
                let evicted = sweep_once(&table, retention, Utc::now()).await;
                if evicted > 0 {
                    tracing::info!(evicted, "Retention sweep: evicted terminal executions");
                } else {
                    tracing::debug!("Retention sweep: nothing to evict");
                }
            }
        }
    }
}

/// One sweep pass. Returns the number of records evicted.
pub async fn sweep_once(table: &ExecutionTable, retention: Duration, now: Timestamp) -> usize {
    let retention = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX);
    let cutoff = now.checked_sub_signed(retention).unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);

    let mut evicted = 0;
    for id in table.terminal_before(cutoff).await {
        if table.evict_if_expired(&id, cutoff).await {
            evicted += 1;
        }
    }
    evicted
}
