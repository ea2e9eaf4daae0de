//! Status polling for a dispatched execution.

use chrono::Utc;
use conductor_remote::RemoteState;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::controller::{ExecutionTask, Stop};

const DEFAULT_JOB_ERROR: &str = "remote execution reported an error";

/// How polling of one remote execution ended.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum MonitorOutcome {
    /// The remote run succeeded and the record is `Completed`.
    Completed,
    /// The remote run failed; the caller charges the retry budget.
    JobFailed(String),
    /// The record went terminal under us (e.g. cancelled), stop quietly.
    Detached,
}

/// Poll `remote_id` every `poll_interval` until the remote status is
/// terminal. Transport failures are logged and retried on the next tick
/// without charging the retry budget.
pub(crate) async fn watch(
    task: &ExecutionTask,
    remote_id: &str,
    deadline: Instant,
) -> Result<MonitorOutcome, Stop> {
    let poll_interval = task.shared.config.poll_interval;
    let mut ticker = interval_at(Instant::now() + poll_interval, poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let execution_id = task.execution_id.as_str();

    loop {
        task.guard(deadline, ticker.tick()).await?;

        let status = match task
            .guard(deadline, task.shared.dispatcher.fetch_status(remote_id))
            .await?
        {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(
                    execution_id,
                    remote_execution_id = %remote_id,
                    error = %e,
                    "Status poll failed, retrying on next tick",
                );
                continue;
            }
        };

        match status.state {
            RemoteState::Success => {
                let output = status
                    .output
                    .unwrap_or_else(|| serde_json::Value::Object(Default::default()));
                let completed = task
                    .shared
                    .transition(execution_id, |r| {
                        if r.is_terminal() {
                            return Ok(false);
                        }
                        r.complete(output, Utc::now())?;
                        Ok(true)
                    })
                    .await;

                return Ok(match completed {
                    Ok(updated) if updated.value => {
                        tracing::info!(
                            execution_id,
                            remote_execution_id = %remote_id,
                            duration_ms = updated.record.duration(Utc::now()).num_milliseconds(),
                            "Execution completed",
                        );
                        MonitorOutcome::Completed
                    }
                    Ok(_) => MonitorOutcome::Detached,
                    Err(e) => {
                        tracing::error!(execution_id, error = %e, "Failed to record completion");
                        MonitorOutcome::Detached
                    }
                });
            }
            RemoteState::Error => {
                let message = status
                    .error
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_JOB_ERROR.to_string());
                return Ok(MonitorOutcome::JobFailed(message));
            }
            RemoteState::Running | RemoteState::Other(_) => {
                if let RemoteState::Other(state) = &status.state {
                    tracing::debug!(execution_id, state = %state, "Unrecognised remote status, still waiting");
                }

                let refreshed = task
                    .shared
                    .transition(execution_id, |r| {
                        if r.is_terminal() {
                            return Ok(false);
                        }
                        r.touch(Utc::now());
                        Ok(true)
                    })
                    .await;

                match refreshed {
                    Ok(updated) if updated.value => {}
                    Ok(_) => return Ok(MonitorOutcome::Detached),
                    Err(e) => {
                        tracing::error!(execution_id, error = %e, "Failed to refresh execution");
                        return Ok(MonitorOutcome::Detached);
                    }
                }
            }
        }
    }
}
