//! The execution record store seam.
//!
//! The engine only needs upsert-by-id, point reads, per-job history and a
//! scan of unfinished records for recovery. Records are never deleted
//! through this trait; compaction of durable history is somebody else's job.

use async_trait::async_trait;
use conductor_core::execution::ExecutionRecord;

use crate::models::execution::ExecutionRow;
use crate::repositories::ExecutionRepo;
use crate::DbPool;

/// Errors from the durable store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The database rejected or failed the query.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row could not be mapped back to a record.
    #[error("Corrupt execution row {id}: {reason}")]
    Corrupt { id: String, reason: String },

    /// The backing store is not reachable (used by non-SQL stores).
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Durable upsert/read of execution records.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Insert or overwrite the record with the same id.
    async fn upsert(&self, record: &ExecutionRecord) -> Result<(), StoreError>;

    /// Point read. `Ok(None)` when the id is unknown.
    async fn get(&self, id: &str) -> Result<Option<ExecutionRecord>, StoreError>;

    /// Executions of one job, most recent first, at most `limit`.
    async fn list_by_job(&self, job_id: &str, limit: i64)
        -> Result<Vec<ExecutionRecord>, StoreError>;

    /// Every non-terminal execution, oldest first.
    async fn list_active(&self) -> Result<Vec<ExecutionRecord>, StoreError>;
}

/// Postgres-backed [`ExecutionStore`].
#[derive(Clone)]
pub struct PgExecutionStore {
    pool: DbPool,
}

impl PgExecutionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn to_record(row: ExecutionRow) -> Result<ExecutionRecord, StoreError> {
    let id = row.id.clone();
    ExecutionRecord::try_from(row).map_err(|reason| StoreError::Corrupt { id, reason })
}

#[async_trait]
impl ExecutionStore for PgExecutionStore {
    async fn upsert(&self, record: &ExecutionRecord) -> Result<(), StoreError> {
        ExecutionRepo::upsert(&self.pool, record).await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<ExecutionRecord>, StoreError> {
        ExecutionRepo::find_by_id(&self.pool, id)
            .await?
            .map(to_record)
            .transpose()
    }

    async fn list_by_job(
        &self,
        job_id: &str,
        limit: i64,
    ) -> Result<Vec<ExecutionRecord>, StoreError> {
        ExecutionRepo::list_by_job(&self.pool, job_id, limit)
            .await?
            .into_iter()
            .map(to_record)
            .collect()
    }

    async fn list_active(&self) -> Result<Vec<ExecutionRecord>, StoreError> {
        ExecutionRepo::list_active(&self.pool)
            .await?
            .into_iter()
            .map(to_record)
            .collect()
    }
}
