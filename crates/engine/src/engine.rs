//! Caller-facing execution API.
//!
//! [`ExecutionEngine`] accepts job runs, answers status queries and
//! cancellations, and owns the background tasks: one
//! [`ExecutionTask`](crate::controller) per live execution plus the
//! retention sweeper. Tasks share an [`EngineShared`] and talk to each
//! other only through the [`ExecutionTable`].

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use conductor_core::error::CoreError;
use conductor_core::execution::{ExecutionHandle, ExecutionRecord, ExecutionSummary};
use conductor_core::id::{IdGenerator, UuidIdGenerator};
use conductor_core::options::{clamp_limit, normalize_input, validate_job_id, ExecuteOptions};
use conductor_core::status::ExecutionStatus;
use conductor_core::types::ExecutionId;
use conductor_db::ExecutionStore;
use conductor_events::{EventBus, ExecutionEvent};
use conductor_remote::RemoteDispatcher;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::EngineConfig;
use crate::controller::ExecutionTask;
use crate::error::EngineResult;
use crate::sweeper;
use crate::table::{sort_most_recent_first, ExecutionTable, Updated};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// State shared by the engine handle and every execution task.
pub(crate) struct EngineShared {
    pub(crate) table: Arc<ExecutionTable>,
    pub(crate) dispatcher: Arc<dyn RemoteDispatcher>,
    pub(crate) config: EngineConfig,
    pub(crate) permits: Arc<Semaphore>,
    /// Root token; every execution token is a child of it.
    pub(crate) shutdown: CancellationToken,
    events: Option<Arc<EventBus>>,
    tokens: Mutex<HashMap<ExecutionId, CancellationToken>>,
    tasks: TaskTracker,
}

impl EngineShared {
    /// Atomically update a record and publish an event if its status
    /// changed.
    pub(crate) async fn transition<T, F>(&self, id: &str, f: F) -> EngineResult<Updated<T>>
    where
        F: FnOnce(&mut ExecutionRecord) -> Result<T, CoreError>,
    {
        let updated = self.table.update(id, f).await?;
        if updated.status_changed() {
            tracing::debug!(
                execution_id = %id,
                from = %updated.previous,
                to = %updated.record.status,
                "Execution status changed",
            );
            self.publish(&updated.record);
        }
        Ok(updated)
    }

    fn publish(&self, record: &ExecutionRecord) {
        if let Some(bus) = &self.events {
            bus.publish(ExecutionEvent::from_record(record));
        }
    }

    fn lock_tokens(&self) -> MutexGuard<'_, HashMap<ExecutionId, CancellationToken>> {
        self.tokens.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register the cancellation token for `id`, or `None` if a task
    /// already owns it. Must happen before the record is visible in the
    /// table, so every `cancel` that finds the record also finds its token.
    fn register(&self, id: &str) -> Option<CancellationToken> {
        match self.lock_tokens().entry(id.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => Some(slot.insert(self.shutdown.child_token()).clone()),
        }
    }

    /// Spawn the owning task for `record`.
    fn spawn_execution(
        self: &Arc<Self>,
        record: &ExecutionRecord,
        cancel: CancellationToken,
        resume_remote_id: Option<String>,
    ) {
        let task = ExecutionTask::new(Arc::clone(self), record, cancel, resume_remote_id);
        self.tasks.spawn(task.run());
    }

    /// Signal the owning task of `id`, if it is still running.
    fn signal(&self, id: &str) {
        if let Some(token) = self.lock_tokens().get(id) {
            token.cancel();
        }
    }

    pub(crate) fn release_token(&self, id: &str) {
        self.lock_tokens().remove(id);
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for [`ExecutionEngine`]. The store and dispatcher are required;
/// everything else has a default.
pub struct ExecutionEngineBuilder {
    store: Arc<dyn ExecutionStore>,
    dispatcher: Arc<dyn RemoteDispatcher>,
    config: EngineConfig,
    ids: Arc<dyn IdGenerator>,
    events: Option<Arc<EventBus>>,
}

impl ExecutionEngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the default UUIDv7 id generator.
    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Publish an [`ExecutionEvent`] on `bus` for every status change.
    pub fn event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn build(self) -> ExecutionEngine {
        let permits = Arc::new(Semaphore::new(self.config.max_concurrent.max(1)));
        let shared = Arc::new(EngineShared {
            table: Arc::new(ExecutionTable::new(self.store)),
            dispatcher: self.dispatcher,
            config: self.config,
            permits,
            shutdown: CancellationToken::new(),
            events: self.events,
            tokens: Mutex::new(HashMap::new()),
            tasks: TaskTracker::new(),
        });
        ExecutionEngine {
            shared,
            ids: self.ids,
            sweeper_started: AtomicBool::new(false),
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct ExecutionEngine {
    pub(crate) shared: Arc<EngineShared>,
    ids: Arc<dyn IdGenerator>,
    sweeper_started: AtomicBool,
}

impl ExecutionEngine {
    pub fn builder(
        store: Arc<dyn ExecutionStore>,
        dispatcher: Arc<dyn RemoteDispatcher>,
    ) -> ExecutionEngineBuilder {
        ExecutionEngineBuilder {
            store,
            dispatcher,
            config: EngineConfig::default(),
            ids: Arc::new(UuidIdGenerator),
            events: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// The live table, for inspection.
    pub fn table(&self) -> &Arc<ExecutionTable> {
        &self.shared.table
    }

    /// Record a new execution of `job_id` and start driving it in the
    /// background. Returns as soon as the `Pending` record exists.
    ///
    /// Invalid input is rejected synchronously and creates no record.
    pub async fn execute(
        &self,
        job_id: &str,
        input: serde_json::Value,
        options: ExecuteOptions,
    ) -> EngineResult<ExecutionHandle> {
        validate_job_id(job_id)?;
        let input = normalize_input(input)?;
        let config = &self.shared.config;
        let options = options.resolve(config.default_max_retries, config.default_timeout)?;

        if self.shared.shutdown.is_cancelled() {
            return Err(CoreError::InvalidState("engine is shutting down".to_string()).into());
        }

        let record = ExecutionRecord::new(self.ids.next_id(), job_id.to_string(), input, &options, Utc::now());
        let handle = ExecutionHandle {
            execution_id: record.id.clone(),
            status: record.status,
        };

        let Some(cancel) = self.shared.register(&record.id) else {
            return Err(CoreError::InvalidState(format!(
                "execution id '{}' is already in use",
                record.id
            ))
            .into());
        };
        self.shared.table.put(record.clone()).await;
        self.shared.publish(&record);
        tracing::info!(
            execution_id = %record.id,
            job_id,
            max_retries = record.max_retries,
            timeout_ms = record.timeout_ms,
            "Execution created",
        );

        self.shared.spawn_execution(&record, cancel, None);
        Ok(handle)
    }

    /// Current snapshot of an execution. Falls back to the store for
    /// records no longer (or not yet) in memory.
    pub async fn get_status(&self, execution_id: &str) -> EngineResult<ExecutionSummary> {
        let record = self.shared.table.get(execution_id).await?;
        Ok(record.summary(Utc::now()))
    }

    /// Cancel a non-terminal execution.
    ///
    /// Cancelling an already cancelled execution succeeds without change;
    /// cancelling a completed or failed one is [`CoreError::InvalidState`].
    pub async fn cancel(&self, execution_id: &str) -> EngineResult<()> {
        if execution_id.trim().is_empty() {
            return Err(CoreError::Validation("execution_id must not be empty".to_string()).into());
        }

        // Loads store-only records into the table.
        self.shared.table.get(execution_id).await?;

        let updated = self
            .shared
            .transition(execution_id, |r| {
                let status = r.status;
                match status {
                    ExecutionStatus::Cancelled => Ok(false),
                    _ if status.is_cancellable() => {
                        r.cancel(Utc::now())?;
                        Ok(true)
                    }
                    _ => Err(CoreError::InvalidState(format!(
                        "Cannot cancel execution in status '{status}'"
                    ))),
                }
            })
            .await?;

        if updated.value {
            tracing::info!(
                execution_id,
                job_id = %updated.record.job_id,
                previous = %updated.previous,
                "Execution cancel requested",
            );
        }
        self.shared.signal(execution_id);
        Ok(())
    }

    /// Executions of `job_id`, most recent first.
    ///
    /// History comes from the store; records still in memory override
    /// their stored copy, since a failed persist may have left the store
    /// behind.
    pub async fn list_executions(
        &self,
        job_id: &str,
        limit: Option<i64>,
    ) -> EngineResult<Vec<ExecutionSummary>> {
        validate_job_id(job_id)?;
        let limit = clamp_limit(limit);

        let stored = self.shared.table.store().list_by_job(job_id, limit).await?;
        let live = self.shared.table.list_by_job(job_id, limit as usize).await;

        let mut merged: HashMap<ExecutionId, ExecutionRecord> =
            stored.into_iter().map(|r| (r.id.clone(), r)).collect();
        for record in live {
            merged.insert(record.id.clone(), record);
        }

        let mut records: Vec<ExecutionRecord> = merged.into_values().collect();
        sort_most_recent_first(&mut records);
        records.truncate(limit as usize);

        let now = Utc::now();
        Ok(records.iter().map(|r| r.summary(now)).collect())
    }

    /// Activate a job definition on the remote engine.
    pub async fn enable_job(&self, job_id: &str) -> EngineResult<()> {
        validate_job_id(job_id)?;
        self.shared.dispatcher.enable(job_id).await?;
        tracing::info!(job_id, "Job enabled");
        Ok(())
    }

    /// Deactivate a job definition on the remote engine.
    pub async fn disable_job(&self, job_id: &str) -> EngineResult<()> {
        validate_job_id(job_id)?;
        self.shared.dispatcher.disable(job_id).await?;
        tracing::info!(job_id, "Job disabled");
        Ok(())
    }

    /// Resume every non-terminal execution found in the store.
    ///
    /// Dispatched (`Running`) executions go straight back to polling; the
    /// rest are dispatched again. Each gets a fresh full timeout. Returns
    /// the number of executions resumed.
    pub async fn recover(&self) -> EngineResult<usize> {
        let active = self.shared.table.store().list_active().await?;
        let mut resumed = 0;

        for record in active {
            if record.is_terminal() {
                continue;
            }
            let Some(cancel) = self.shared.register(&record.id) else {
                continue;
            };
            if !self.shared.table.insert_if_absent(record.clone()).await {
                self.shared.release_token(&record.id);
                continue;
            }

            let resume_remote_id = match record.status {
                ExecutionStatus::Running => record.remote_execution_id.clone(),
                _ => None,
            };
            tracing::info!(
                execution_id = %record.id,
                job_id = %record.job_id,
                status = %record.status,
                retry_count = record.retry_count,
                "Resuming execution",
            );
            self.shared.spawn_execution(&record, cancel, resume_remote_id);
            resumed += 1;
        }

        if resumed > 0 {
            tracing::info!(resumed, "Recovered in-flight executions");
        }
        Ok(resumed)
    }

    /// Start the periodic retention sweeper. Calling it again is a no-op.
    pub fn start_sweeper(&self) {
        if self.sweeper_started.swap(true, Ordering::SeqCst) {
            return;
        }
        let config = &self.shared.config;
        self.shared.tasks.spawn(sweeper::run(
            Arc::clone(&self.shared.table),
            config.retention,
            config.sweep_interval,
            self.shared.shutdown.child_token(),
        ));
    }

    /// Run one retention pass now. Returns the number of records evicted.
    pub async fn sweep_now(&self) -> usize {
        sweeper::sweep_once(&self.shared.table, self.shared.config.retention, Utc::now()).await
    }

    /// Number of executions currently held in memory.
    pub async fn tracked_count(&self) -> usize {
        self.shared.table.len().await
    }

    /// Stop every background task.
    ///
    /// Live executions are left in their current, non-terminal status so
    /// [`recover`](Self::recover) can pick them up on the next start.
    /// Waits at most `shutdown_grace` for tasks to exit.
    pub async fn shutdown(&self) {
        tracing::info!(in_flight = self.shared.lock_tokens().len(), "Execution engine shutting down");
        self.shared.shutdown.cancel();
        self.shared.tasks.close();

        let grace = self.shared.config.shutdown_grace;
        if tokio::time::timeout(grace, self.shared.tasks.wait()).await.is_err() {
            tracing::warn!(
                remaining = self.shared.tasks.len(),
                grace_secs = grace.as_secs(),
                "Shutdown grace period elapsed with tasks still running",
            );
        } else {
            tracing::info!("Execution engine stopped");
        }
    }
}
