//! Repository for the `executions` table.

use conductor_core::execution::ExecutionRecord;
use conductor_core::status::ExecutionStatus;
use sqlx::PgPool;

use crate::models::execution::ExecutionRow;

/// Column list for `executions` queries.
const COLUMNS: &str = "\
    id, job_id, remote_execution_id, status_id, input, output, error_message, \
    started_at, last_updated_at, completed_at, retry_count, max_retries, \
    timeout_ms, metadata";

/// Provides query operations for execution records.
pub struct ExecutionRepo;

impl ExecutionRepo {
    /// Insert or fully overwrite an execution row.
    ///
    /// `input` and `metadata` are immutable after creation, so the update
    /// branch leaves them untouched.
    pub async fn upsert(pool: &PgPool, record: &ExecutionRecord) -> Result<(), sqlx::Error> {
        let timeout_ms =
            i64::try_from(record.timeout_ms).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
        sqlx::query(
            "INSERT INTO executions \
                 (id, job_id, remote_execution_id, status_id, input, output, error_message, \
                  started_at, last_updated_at, completed_at, retry_count, max_retries, \
                  timeout_ms, metadata) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             ON CONFLICT (id) DO UPDATE \
             SET remote_execution_id = EXCLUDED.remote_execution_id, \
                 status_id = EXCLUDED.status_id, \
                 output = EXCLUDED.output, \
                 error_message = EXCLUDED.error_message, \
                 last_updated_at = EXCLUDED.last_updated_at, \
                 completed_at = EXCLUDED.completed_at, \
                 retry_count = EXCLUDED.retry_count, \
                 updated_at = NOW()",
        )
        .bind(&record.id)
        .bind(&record.job_id)
        .bind(record.remote_execution_id.as_deref())
        .bind(record.status.id())
        .bind(&record.input)
        .bind(record.output.as_ref())
        .bind(record.error.as_deref())
        .bind(record.started_at)
        .bind(record.last_updated_at)
        .bind(record.completed_at)
        .bind(record.retry_count as i32)
        .bind(record.max_retries as i32)
        .bind(timeout_ms)
        .bind(&record.metadata)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Find an execution by its ID.
    pub async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<ExecutionRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM executions WHERE id = $1");
        sqlx::query_as::<_, ExecutionRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List executions of a job, most recent first.
    pub async fn list_by_job(
        pool: &PgPool,
        job_id: &str,
        limit: i64,
    ) -> Result<Vec<ExecutionRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM executions \
             WHERE job_id = $1 \
             ORDER BY started_at DESC, id DESC \
             LIMIT $2"
        );
        sqlx::query_as::<_, ExecutionRow>(&query)
            .bind(job_id)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// List every execution that has not reached a terminal status.
    ///
    /// Used on startup to resume work interrupted by a restart.
    pub async fn list_active(pool: &PgPool) -> Result<Vec<ExecutionRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM executions \
             WHERE status_id IN ($1, $2, $3) \
             ORDER BY started_at ASC"
        );
        sqlx::query_as::<_, ExecutionRow>(&query)
            .bind(ExecutionStatus::Pending.id())
            .bind(ExecutionStatus::Running.id())
            .bind(ExecutionStatus::Retrying.id())
            .fetch_all(pool)
            .await
    }
}
