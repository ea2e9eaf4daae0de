//! Execution row model and its conversion to the domain record.

use conductor_core::execution::ExecutionRecord;
use conductor_core::status::{ExecutionStatus, StatusId};
use conductor_core::types::Timestamp;
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `executions` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ExecutionRow {
    pub id: String,
    pub job_id: String,
    pub remote_execution_id: Option<String>,
    pub status_id: StatusId,
    pub input: serde_json::Value,
    pub output: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub started_at: Timestamp,
    pub last_updated_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub timeout_ms: i64,
    pub metadata: serde_json::Value,
}

impl TryFrom<ExecutionRow> for ExecutionRecord {
    type Error = String;

    fn try_from(row: ExecutionRow) -> Result<Self, Self::Error> {
        let status = ExecutionStatus::from_id(row.status_id)
            .ok_or_else(|| format!("unknown status_id {}", row.status_id))?;
        let retry_count =
            u32::try_from(row.retry_count).map_err(|_| "negative retry_count".to_string())?;
        let max_retries =
            u32::try_from(row.max_retries).map_err(|_| "negative max_retries".to_string())?;
        let timeout_ms =
            u64::try_from(row.timeout_ms).map_err(|_| "negative timeout_ms".to_string())?;

        Ok(ExecutionRecord {
            id: row.id,
            job_id: row.job_id,
            remote_execution_id: row.remote_execution_id,
            status,
            input: row.input,
            output: row.output,
            error: row.error_message,
            started_at: row.started_at,
            last_updated_at: row.last_updated_at,
            completed_at: row.completed_at,
            retry_count,
            max_retries,
            timeout_ms,
            metadata: row.metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::*;

    fn row(status_id: StatusId) -> ExecutionRow {
        let now = Utc::now();
        ExecutionRow {
            id: "exec-1".into(),
            job_id: "job1".into(),
            remote_execution_id: Some("r-1".into()),
            status_id,
            input: json!({"x": 1}),
            output: Some(json!({"result": 42})),
            error_message: None,
            started_at: now,
            last_updated_at: now,
            completed_at: Some(now),
            retry_count: 1,
            max_retries: 3,
            timeout_ms: 5_000,
            metadata: json!({}),
        }
    }

    #[test]
    fn converts_known_status() {
        let record = ExecutionRecord::try_from(row(3)).unwrap();
        assert_eq!(record.status, ExecutionStatus::Completed);
        assert_eq!(record.retry_count, 1);
        assert_eq!(record.output, Some(json!({"result": 42})));
    }

    #[test]
    fn rejects_unknown_status() {
        let err = ExecutionRecord::try_from(row(42)).unwrap_err();
        assert!(err.contains("42"));
    }

    #[test]
    fn rejects_negative_counters() {
        let mut bad = row(1);
        bad.retry_count = -1;
        assert!(ExecutionRecord::try_from(bad).is_err());
    }
}
