//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] fans out an [`ExecutionEvent`] for every state transition
//! the engine makes. It is designed to be shared via `Arc<EventBus>`.

use chrono::{DateTime, Utc};
use conductor_core::execution::ExecutionRecord;
use conductor_core::status::ExecutionStatus;
use conductor_core::types::{ExecutionId, JobId};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// ExecutionEvent
// ---------------------------------------------------------------------------

/// One execution entering a new status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub execution_id: ExecutionId,
    pub job_id: JobId,
    pub status: ExecutionStatus,
    pub retry_count: u32,
    pub error: Option<String>,
    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl ExecutionEvent {
    /// Snapshot the current status of `record`.
    pub fn from_record(record: &ExecutionRecord) -> Self {
        Self {
            execution_id: record.id.clone(),
            job_id: record.job_id.clone(),
            status: record.status,
            retry_count: record.retry_count,
            error: record.error.clone(),
            timestamp: Utc::now(),
        }
    }

    /// Dot-separated event name, e.g. `"execution.completed"`.
    pub fn event_type(&self) -> String {
        format!("execution.{}", self.status)
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
pub struct EventBus {
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: ExecutionEvent) {
        // Ignore the SendError, it only means there are zero receivers.
        if self.sender.send(event).is_err() {
            tracing::trace!("Execution event dropped, no subscribers");
        }
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
