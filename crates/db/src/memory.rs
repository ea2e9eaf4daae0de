//! In-memory [`ExecutionStore`] for tests or local runs.
//!
//! Cloning shares the underlying map, so a test can keep a handle and
//! inspect what the engine persisted, or hand the same store to a second
//! engine to simulate a restart. [`MemoryExecutionStore::set_unavailable`]
//! injects storage failures.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use conductor_core::execution::ExecutionRecord;

use crate::store::{ExecutionStore, StoreError};

#[derive(Clone, Default)]
pub struct MemoryExecutionStore {
    records: Arc<Mutex<HashMap<String, ExecutionRecord>>>,
    unavailable: Arc<AtomicBool>,
    upserts: Arc<AtomicU64>,
}

impl MemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of successful upserts so far.
    pub fn upsert_count(&self) -> u64 {
        self.upserts.load(Ordering::SeqCst)
    }

    /// Snapshot of a stored record, bypassing failure injection.
    pub fn peek(&self, id: &str) -> Option<ExecutionRecord> {
        self.lock().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ExecutionRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ExecutionStore for MemoryExecutionStore {
    async fn upsert(&self, record: &ExecutionRecord) -> Result<(), StoreError> {
        self.check_available()?;
        self.lock().insert(record.id.clone(), record.clone());
        self.upserts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<ExecutionRecord>, StoreError> {
        self.check_available()?;
        Ok(self.peek(id))
    }

    async fn list_by_job(
        &self,
        job_id: &str,
        limit: i64,
    ) -> Result<Vec<ExecutionRecord>, StoreError> {
        self.check_available()?;
        let mut records: Vec<ExecutionRecord> = self
            .lock()
            .values()
            .filter(|r| r.job_id == job_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            b.started_at
                .cmp(&a.started_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        records.truncate(limit.max(0) as usize);
        Ok(records)
    }

    async fn list_active(&self) -> Result<Vec<ExecutionRecord>, StoreError> {
        self.check_available()?;
        let mut records: Vec<ExecutionRecord> = self
            .lock()
            .values()
            .filter(|r| !r.is_terminal())
            .cloned()
            .collect();
        records.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use chrono::Utc;
    use conductor_core::options::ResolvedOptions;
    use conductor_core::status::ExecutionStatus;
    use serde_json::json;

    use super::*;

    fn record(id: &str, job_id: &str, offset_secs: i64) -> ExecutionRecord {
        let options = ResolvedOptions {
            max_retries: 3,
            timeout: Duration::from_secs(60),
            metadata: json!({}),
        };
        ExecutionRecord::new(
            id.into(),
            job_id.into(),
            json!({"x": 1}),
            &options,
            Utc::now() + chrono::Duration::seconds(offset_secs),
        )
    }

    #[tokio::test]
    async fn upsert_then_get_round_trips() {
        let store = MemoryExecutionStore::new();
        let mut rec = record("a", "job1", 0);
        store.upsert(&rec).await.unwrap();

        rec.mark_dispatched("r-1".into(), Utc::now()).unwrap();
        rec.complete(json!({"result": 42}), Utc::now()).unwrap();
        store.upsert(&rec).await.unwrap();

        let loaded = store.get("a").await.unwrap().unwrap();
        assert_eq!(loaded, rec);
        assert_eq!(store.len(), 1);
        assert_eq!(store.upsert_count(), 2);
    }

    #[tokio::test]
    async fn missing_id_is_none() {
        let store = MemoryExecutionStore::new();
        assert!(store.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_by_job_is_most_recent_first_and_limited() {
        let store = MemoryExecutionStore::new();
        store.upsert(&record("old", "job1", -20)).await.unwrap();
        store.upsert(&record("mid", "job1", -10)).await.unwrap();
        store.upsert(&record("new", "job1", 0)).await.unwrap();
        store.upsert(&record("other", "job2", 0)).await.unwrap();

        let listed = store.list_by_job("job1", 2).await.unwrap();
        let ids: Vec<&str> = listed.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["new", "mid"]);
    }

    #[tokio::test]
    async fn list_active_skips_terminal() {
        let store = MemoryExecutionStore::new();
        let mut done = record("done", "job1", 0);
        done.cancel(Utc::now()).unwrap();
        store.upsert(&done).await.unwrap();
        store.upsert(&record("live", "job1", 0)).await.unwrap();

        let active = store.list_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].status, ExecutionStatus::Pending);
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_operation() {
        let store = MemoryExecutionStore::new();
        store.set_unavailable(true);
        assert_matches!(
            store.upsert(&record("a", "job1", 0)).await,
            Err(StoreError::Unavailable(_))
        );
        assert_matches!(store.get("a").await, Err(StoreError::Unavailable(_)));
        assert!(store.is_empty());

        store.set_unavailable(false);
        assert!(store.upsert(&record("a", "job1", 0)).await.is_ok());
    }
}
