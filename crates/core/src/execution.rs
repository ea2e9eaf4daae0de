//! The execution record and the transitions allowed on it.
//!
//! All mutation goes through the methods here so the record invariants
//! hold no matter which task drives it:
//!
//! - `retry_count <= max_retries`; a failure with no budget left is terminal.
//! - `completed_at` is set exactly once, on entry to a terminal status.
//! - `remote_execution_id` is set together with the first move to `Running`.
//! - `last_updated_at` never goes backwards.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::options::ResolvedOptions;
use crate::status::ExecutionStatus;
use crate::types::{ExecutionId, JobId, Timestamp};

/// One requested run of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: ExecutionId,
    pub job_id: JobId,
    pub remote_execution_id: Option<String>,
    pub status: ExecutionStatus,
    pub input: serde_json::Value,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub started_at: Timestamp,
    pub last_updated_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub timeout_ms: u64,
    pub metadata: serde_json::Value,
}

/// What the retry policy decided after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Budget remained; the record is `Retrying` with the new count.
    Retry { retry_count: u32 },
    /// Budget exhausted; the record is `Failed`.
    Exhausted,
}

impl ExecutionRecord {
    /// A fresh `Pending` record.
    pub fn new(
        id: ExecutionId,
        job_id: JobId,
        input: serde_json::Value,
        options: &ResolvedOptions,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            job_id,
            remote_execution_id: None,
            status: ExecutionStatus::Pending,
            input,
            output: None,
            error: None,
            started_at: now,
            last_updated_at: now,
            completed_at: None,
            retry_count: 0,
            max_retries: options.max_retries,
            timeout_ms: u64::try_from(options.timeout.as_millis()).unwrap_or(u64::MAX),
            metadata: options.metadata.clone(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Timeout the execution was created with.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Refresh `last_updated_at` without changing status.
    pub fn touch(&mut self, now: Timestamp) {
        if now > self.last_updated_at {
            self.last_updated_at = now;
        }
    }

    /// Move to `to`, enforcing the state machine and stamping
    /// `completed_at` on the first terminal entry.
    pub fn transition(&mut self, to: ExecutionStatus, now: Timestamp) -> Result<(), CoreError> {
        self.status
            .validate_transition(to)
            .map_err(CoreError::InvalidState)?;
        self.status = to;
        self.touch(now);
        if to.is_terminal() && self.completed_at.is_none() {
            self.completed_at = Some(now.max(self.started_at));
        }
        Ok(())
    }

    /// Record a successful dispatch.
    pub fn mark_dispatched(
        &mut self,
        remote_execution_id: String,
        now: Timestamp,
    ) -> Result<(), CoreError> {
        self.transition(ExecutionStatus::Running, now)?;
        self.remote_execution_id = Some(remote_execution_id);
        Ok(())
    }

    /// Charge one failure against the retry budget.
    pub fn record_failure(
        &mut self,
        message: impl Into<String>,
        now: Timestamp,
    ) -> Result<RetryDecision, CoreError> {
        let message = message.into();
        if self.retry_count < self.max_retries {
            self.transition(ExecutionStatus::Retrying, now)?;
            self.retry_count += 1;
            self.error = Some(message);
            Ok(RetryDecision::Retry {
                retry_count: self.retry_count,
            })
        } else {
            self.transition(ExecutionStatus::Failed, now)?;
            self.error = Some(message);
            Ok(RetryDecision::Exhausted)
        }
    }

    /// Record remote success with its output.
    pub fn complete(&mut self, output: serde_json::Value, now: Timestamp) -> Result<(), CoreError> {
        self.transition(ExecutionStatus::Completed, now)?;
        self.output = Some(output);
        self.error = None;
        Ok(())
    }

    /// Cancel by request or timeout. Neither is a job failure, so any
    /// transient error message is cleared.
    pub fn cancel(&mut self, now: Timestamp) -> Result<(), CoreError> {
        self.transition(ExecutionStatus::Cancelled, now)?;
        self.error = None;
        Ok(())
    }

    /// Wall-clock duration: `completed_at - started_at` when terminal,
    /// `now - started_at` otherwise. Never negative.
    pub fn duration(&self, now: Timestamp) -> chrono::Duration {
        let end = self.completed_at.unwrap_or(now);
        (end - self.started_at).max(chrono::Duration::zero())
    }

    /// Caller-facing snapshot.
    pub fn summary(&self, now: Timestamp) -> ExecutionSummary {
        ExecutionSummary {
            execution_id: self.id.clone(),
            job_id: self.job_id.clone(),
            status: self.status,
            output: self.output.clone(),
            error: self.error.clone(),
            duration_ms: self.duration(now).num_milliseconds(),
            metadata: self.metadata.clone(),
            retry_count: self.retry_count,
            max_retries: self.max_retries,
            remote_execution_id: self.remote_execution_id.clone(),
            started_at: self.started_at,
            completed_at: self.completed_at,
        }
    }
}

/// Read-only view returned by status queries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionSummary {
    pub execution_id: ExecutionId,
    pub job_id: JobId,
    pub status: ExecutionStatus,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub duration_ms: i64,
    pub metadata: serde_json::Value,
    pub retry_count: u32,
    pub max_retries: u32,
    pub remote_execution_id: Option<String>,
    pub started_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

/// Returned by `execute`: the new id and its initial status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionHandle {
    pub execution_id: ExecutionId,
    pub status: ExecutionStatus,
}
