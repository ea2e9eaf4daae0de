//! Per-execution task: dispatch with retry and backoff, then hand off to
//! the status monitor.
//!
//! One [`ExecutionTask`] owns one execution from the moment it gets a
//! concurrency permit until the record is terminal, the execution is
//! cancelled, or the engine shuts down. Every suspension point goes through
//! [`ExecutionTask::guard`], which races the work against the execution's
//! cancellation token and its single overall deadline.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use conductor_core::error::CoreError;
use conductor_core::execution::{ExecutionRecord, RetryDecision};
use conductor_core::types::{ExecutionId, JobId};
use conductor_remote::RemoteError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::engine::EngineShared;
use crate::error::{EngineError, EngineResult};
use crate::monitor::{self, MonitorOutcome};

/// Why a task stopped before the record reached a terminal status on its
/// own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stop {
    /// Explicit `cancel` request.
    Cancelled,
    /// The execution's deadline passed.
    TimedOut,
    /// The engine is shutting down; the record is left resumable.
    Shutdown,
}

/// A failed attempt that charges the retry budget.
#[derive(Debug)]
pub(crate) enum AttemptFailure {
    /// The remote engine rejected or did not answer the submit call.
    Dispatch(RemoteError),
    /// The remote engine ran the job and reported it failed.
    Job(String),
}

impl std::fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dispatch(e) => write!(f, "dispatch failed: {e}"),
            Self::Job(message) => f.write_str(message),
        }
    }
}

pub(crate) struct ExecutionTask {
    pub(crate) shared: Arc<EngineShared>,
    pub(crate) execution_id: ExecutionId,
    job_id: JobId,
    input: serde_json::Value,
    timeout: Duration,
    cancel: CancellationToken,
    /// Set when resuming a record that was already dispatched.
    resume_remote_id: Option<String>,
}

impl ExecutionTask {
    pub(crate) fn new(
        shared: Arc<EngineShared>,
        record: &ExecutionRecord,
        cancel: CancellationToken,
        resume_remote_id: Option<String>,
    ) -> Self {
        Self {
            shared,
            execution_id: record.id.clone(),
            job_id: record.job_id.clone(),
            input: record.input.clone(),
            timeout: record.timeout(),
            cancel,
            resume_remote_id,
        }
    }

    /// Drive the execution to completion. Never returns an error; every
    /// outcome is recorded on the execution itself.
    pub(crate) async fn run(self) {
        let permits = Arc::clone(&self.shared.permits);
        let permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            permit = permits.acquire_owned() => permit.ok(),
        };

        let result = match permit {
            Some(_permit) => {
                let deadline = Instant::now() + self.timeout;
                tracing::debug!(
                    execution_id = %self.execution_id,
                    job_id = %self.job_id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Execution task started",
                );
                self.drive(deadline).await
            }
            None => Err(self.stop_reason()),
        };

        self.finish(result).await;
        self.shared.release_token(&self.execution_id);
    }

    /// Race `fut` against cancellation and the deadline. Cancellation wins
    /// ties, then the deadline.
    pub(crate) async fn guard<F: Future>(
        &self,
        deadline: Instant,
        fut: F,
    ) -> Result<F::Output, Stop> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(self.stop_reason()),
            _ = tokio::time::sleep_until(deadline) => Err(Stop::TimedOut),
            out = fut => Ok(out),
        }
    }

    fn stop_reason(&self) -> Stop {
        if self.shared.shutdown.is_cancelled() {
            Stop::Shutdown
        } else {
            Stop::Cancelled
        }
    }

    async fn drive(&self, deadline: Instant) -> Result<(), Stop> {
        let finished = self
            .shared
            .table
            .snapshot(&self.execution_id)
            .await
            .map_or(true, |r| r.is_terminal());
        if finished {
            tracing::debug!(
                execution_id = %self.execution_id,
                "Execution already finished before dispatch",
            );
            return Ok(());
        }

        let mut remote_id = self.resume_remote_id.clone();
        loop {
            let current = match remote_id.take() {
                Some(id) => id,
                None => match self.dispatch(deadline).await? {
                    Some(id) => id,
                    None => return Ok(()),
                },
            };

            match monitor::watch(self, &current, deadline).await? {
                MonitorOutcome::Completed | MonitorOutcome::Detached => return Ok(()),
                MonitorOutcome::JobFailed(message) => {
                    if !self
                        .charge_failure(AttemptFailure::Job(message), deadline)
                        .await?
                    {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Submit until one attempt succeeds. Returns the remote id, or `None`
    /// once the record is terminal (budget exhausted or cancelled).
    async fn dispatch(&self, deadline: Instant) -> Result<Option<String>, Stop> {
        loop {
            let submitted = self
                .guard(deadline, self.shared.dispatcher.submit(&self.job_id, &self.input))
                .await?;

            match submitted {
                Ok(remote_id) => {
                    let id_for_record = remote_id.clone();
                    let marked = self
                        .shared
                        .transition(&self.execution_id, move |r| {
                            if r.is_terminal() {
                                return Ok(false);
                            }
                            r.mark_dispatched(id_for_record, Utc::now())?;
                            Ok(true)
                        })
                        .await;

                    return match marked {
                        Ok(updated) if updated.value => {
                            tracing::info!(
                                execution_id = %self.execution_id,
                                job_id = %self.job_id,
                                remote_execution_id = %remote_id,
                                "Execution dispatched",
                            );
                            Ok(Some(remote_id))
                        }
                        Ok(_) => Ok(None),
                        Err(e) => {
                            tracing::error!(
                                execution_id = %self.execution_id,
                                error = %e,
                                "Failed to record dispatch",
                            );
                            Ok(None)
                        }
                    };
                }
                Err(e) => {
                    if !self
                        .charge_failure(AttemptFailure::Dispatch(e), deadline)
                        .await?
                    {
                        return Ok(None);
                    }
                }
            }
        }
    }

    /// Charge one failure. Returns `true` after the backoff sleep if another
    /// attempt should be made, `false` if the record is now terminal.
    async fn charge_failure(&self, failure: AttemptFailure, deadline: Instant) -> Result<bool, Stop> {
        let message = failure.to_string();
        let decision = self
            .shared
            .transition(&self.execution_id, move |r| {
                if r.is_terminal() {
                    return Ok(None);
                }
                r.record_failure(message, Utc::now()).map(Some)
            })
            .await;

        match decision {
            Ok(updated) => match updated.value {
                Some(RetryDecision::Retry { retry_count }) => {
                    let delay = self.shared.config.backoff.delay(retry_count);
                    tracing::warn!(
                        execution_id = %self.execution_id,
                        job_id = %self.job_id,
                        retry_count,
                        max_retries = updated.record.max_retries,
                        backoff_ms = delay.as_millis() as u64,
                        error = %failure,
                        "Attempt failed, retrying",
                    );
                    self.guard(deadline, tokio::time::sleep(delay)).await?;
                    Ok(true)
                }
                Some(RetryDecision::Exhausted) => {
                    tracing::error!(
                        execution_id = %self.execution_id,
                        job_id = %self.job_id,
                        retry_count = updated.record.retry_count,
                        error = %failure,
                        "Execution failed, retries exhausted",
                    );
                    Ok(false)
                }
                None => Ok(false),
            },
            Err(e) => {
                tracing::error!(
                    execution_id = %self.execution_id,
                    error = %e,
                    "Failed to record attempt failure",
                );
                Ok(false)
            }
        }
    }

    async fn finish(&self, result: Result<(), Stop>) {
        let reason = match result {
            Ok(()) => return,
            Err(Stop::Shutdown) => {
                tracing::debug!(
                    execution_id = %self.execution_id,
                    "Engine shutting down, execution left resumable",
                );
                return;
            }
            Err(reason) => reason,
        };

        match self.record_stop().await {
            Ok(true) => match reason {
                Stop::TimedOut => tracing::warn!(
                    execution_id = %self.execution_id,
                    job_id = %self.job_id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Execution timed out, cancelled",
                ),
                _ => tracing::info!(
                    execution_id = %self.execution_id,
                    job_id = %self.job_id,
                    "Execution cancelled",
                ),
            },
            Ok(false) => {}
            Err(e) => tracing::error!(
                execution_id = %self.execution_id,
                error = %e,
                "Failed to record cancellation",
            ),
        }
    }

    /// Cancel the record if it is still live. Returns `false` when it was
    /// already terminal, including when the sweeper has evicted it.
    pub(crate) async fn record_stop(&self) -> EngineResult<bool> {
        let cancelled = self
            .shared
            .transition(&self.execution_id, |r| {
                if r.is_terminal() {
                    return Ok(false);
                }
                r.cancel(Utc::now())?;
                Ok(true)
            })
            .await;

        match cancelled {
            Ok(updated) => Ok(updated.value),
            Err(EngineError::Core(CoreError::NotFound { .. })) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
