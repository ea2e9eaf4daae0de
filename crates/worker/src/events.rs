//! Structured logging of execution lifecycle events.

use conductor_events::ExecutionEvent;
use tokio::sync::broadcast;

/// Log every event received on `rx` until the bus is dropped. Returns the
/// number of events logged.
pub async fn log_events(mut rx: broadcast::Receiver<ExecutionEvent>) -> u64 {
    let mut logged = 0;
    loop {
        match rx.recv().await {
            Ok(event) => {
                tracing::debug!(
                    event_type = %event.event_type(),
                    execution_id = %event.execution_id,
                    job_id = %event.job_id,
                    retry_count = event.retry_count,
                    error = event.error.as_deref().unwrap_or(""),
                    "Execution event",
                );
                logged += 1;
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event logger lagged, events skipped");
            }
            Err(broadcast::error::RecvError::Closed) => {
                tracing::debug!(logged, "Event bus closed, event logger stopping");
                return logged;
            }
        }
    }
}
