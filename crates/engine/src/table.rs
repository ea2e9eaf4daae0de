//! The execution state table.
//!
//! [`ExecutionTable`] is the engine's live view of every execution it has
//! touched since start: a map from execution id to record behind a
//! reader/writer lock, persisted through an [`ExecutionStore`].
//!
//! Writes update memory first and persist afterwards. Persistence for a
//! given id is serialised through a shard lock and always writes the
//! latest in-memory state, so two racing writers can never leave an older
//! snapshot in the store. Storage failures are logged and otherwise
//! ignored: memory stays the source of truth until the next successful
//! persist.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use conductor_core::error::CoreError;
use conductor_core::execution::ExecutionRecord;
use conductor_core::status::ExecutionStatus;
use conductor_core::types::{ExecutionId, Timestamp};
use conductor_db::ExecutionStore;
use tokio::sync::{Mutex, RwLock};

use crate::error::{EngineError, EngineResult};

/// Number of persistence lock shards.
const PERSIST_SHARDS: usize = 16;

/// Result of a successful [`ExecutionTable::update`].
#[derive(Debug)]
pub struct Updated<T> {
    /// The record after the update.
    pub record: ExecutionRecord,
    /// Status before the update.
    pub previous: ExecutionStatus,
    /// Whatever the update closure returned.
    pub value: T,
}

impl<T> Updated<T> {
    pub fn status_changed(&self) -> bool {
        self.previous != self.record.status
    }
}

pub struct ExecutionTable {
    records: RwLock<HashMap<ExecutionId, ExecutionRecord>>,
    store: Arc<dyn ExecutionStore>,
    persist_locks: Vec<Mutex<()>>,
}

impl ExecutionTable {
    pub fn new(store: Arc<dyn ExecutionStore>) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            store,
            persist_locks: (0..PERSIST_SHARDS).map(|_| Mutex::new(())).collect(),
        }
    }

    /// The durable store behind this table.
    pub fn store(&self) -> &Arc<dyn ExecutionStore> {
        &self.store
    }

    /// Insert or replace a record, then persist it.
    pub async fn put(&self, record: ExecutionRecord) {
        let id = record.id.clone();
        self.records.write().await.insert(id.clone(), record);
        self.persist(&id).await;
    }

    /// Insert a record loaded from the store unless the id is already
    /// tracked. Returns `true` if it was inserted. Does not persist.
    pub async fn insert_if_absent(&self, record: ExecutionRecord) -> bool {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return false;
        }
        records.insert(record.id.clone(), record);
        true
    }

    /// Look a record up in memory, falling back to the store.
    ///
    /// A store hit is cached back into memory so later updates (e.g. a
    /// cancellation after restart) act on it.
    pub async fn get(&self, id: &str) -> EngineResult<ExecutionRecord> {
        if let Some(record) = self.snapshot(id).await {
            return Ok(record);
        }

        match self.store.get(id).await? {
            Some(record) => {
                let mut records = self.records.write().await;
                let cached = records.entry(id.to_string()).or_insert(record);
                Ok(cached.clone())
            }
            None => Err(EngineError::Core(CoreError::NotFound {
                entity: "Execution",
                id: id.to_string(),
            })),
        }
    }

    /// In-memory snapshot only.
    pub async fn snapshot(&self, id: &str) -> Option<ExecutionRecord> {
        self.records.read().await.get(id).cloned()
    }

    /// In-memory records of a job, most recent first.
    pub async fn list_by_job(&self, job_id: &str, limit: usize) -> Vec<ExecutionRecord> {
        let mut records: Vec<ExecutionRecord> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.job_id == job_id)
            .cloned()
            .collect();
        sort_most_recent_first(&mut records);
        records.truncate(limit);
        records
    }

    /// Remove a record from memory only. Returns `true` if it was present.
    pub async fn delete(&self, id: &str) -> bool {
        self.records.write().await.remove(id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Apply `f` to the record atomically, then persist.
    ///
    /// `f` runs on a copy under the write lock; the copy replaces the
    /// stored record only if `f` returns `Ok`, so a rejected transition
    /// leaves the record untouched.
    pub async fn update<T, F>(&self, id: &str, f: F) -> EngineResult<Updated<T>>
    where
        F: FnOnce(&mut ExecutionRecord) -> Result<T, CoreError>,
    {
        let updated = {
            let mut records = self.records.write().await;
            let current = records.get_mut(id).ok_or_else(|| CoreError::NotFound {
                entity: "Execution",
                id: id.to_string(),
            })?;
            let previous = current.status;
            let mut next = current.clone();
            let value = f(&mut next)?;
            let changed = next != *current;
            *current = next.clone();
            (
                Updated {
                    record: next,
                    previous,
                    value,
                },
                changed,
            )
        };

        let (updated, changed) = updated;
        if changed {
            self.persist(id).await;
        }
        Ok(updated)
    }

    /// Ids of terminal records completed at or before `cutoff`.
    ///
    /// Holds the read lock only for the scan.
    pub async fn terminal_before(&self, cutoff: Timestamp) -> Vec<ExecutionId> {
        self.records
            .read()
            .await
            .values()
            .filter(|r| r.is_terminal() && r.completed_at.is_some_and(|at| at <= cutoff))
            .map(|r| r.id.clone())
            .collect()
    }

    /// Remove `id` if it is still terminal and completed at or before
    /// `cutoff`. Returns `true` if it was removed.
    pub async fn evict_if_expired(&self, id: &str, cutoff: Timestamp) -> bool {
        let mut records = self.records.write().await;
        let expired = records
            .get(id)
            .is_some_and(|r| r.is_terminal() && r.completed_at.is_some_and(|at| at <= cutoff));
        if expired {
            records.remove(id);
        }
        expired
    }

    /// Write the latest in-memory state of `id` to the store.
    async fn persist(&self, id: &str) {
        let _guard = self.persist_locks[shard_for(id)].lock().await;
        let Some(latest) = self.snapshot(id).await else {
            return;
        };
        if let Err(e) = self.store.upsert(&latest).await {
            tracing::error!(
                execution_id = %id,
                status = %latest.status,
                error = %e,
                "Failed to persist execution; in-memory state kept",
            );
        }
    }
}

fn shard_for(id: &str) -> usize {
    let mut hasher = DefaultHasher::new();
    id.hash(&mut hasher);
    (hasher.finish() as usize) % PERSIST_SHARDS
}

/// Sort by `started_at` descending, ties broken by id descending.
pub(crate) fn sort_most_recent_first(records: &mut [ExecutionRecord]) {
    records.sort_by(|a, b| {
        b.started_at
            .cmp(&a.started_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use chrono::Utc;
    use conductor_core::options::ResolvedOptions;
    use conductor_db::MemoryExecutionStore;
    use serde_json::json;

    use super::*;

    fn record(id: &str, job_id: &str) -> ExecutionRecord {
        let options = ResolvedOptions {
            max_retries: 2,
            timeout: Duration::from_secs(5),
            metadata: json!({}),
        };
        ExecutionRecord::new(id.into(), job_id.into(), json!({"x": 1}), &options, Utc::now())
    }

    fn table() -> (ExecutionTable, MemoryExecutionStore) {
        let store = MemoryExecutionStore::new();
        (ExecutionTable::new(Arc::new(store.clone())), store)
    }

    #[tokio::test]
    async fn put_persists_to_store() {
        let (table, store) = table();
        table.put(record("a", "job1")).await;

        assert_eq!(table.len().await, 1);
        assert_eq!(store.peek("a").unwrap().status, ExecutionStatus::Pending);
    }

    #[tokio::test]
    async fn get_falls_back_to_store_and_caches() {
        let (table, store) = table();
        store.upsert(&record("a", "job1")).await.unwrap();

        let loaded = table.get("a").await.unwrap();
        assert_eq!(loaded.id, "a");
        assert!(table.snapshot("a").await.is_some());
    }

    #[tokio::test]
    async fn get_unknown_is_not_found() {
        let (table, _) = table();
        assert_matches!(
            table.get("missing").await,
            Err(EngineError::Core(CoreError::NotFound { .. }))
        );
    }

    #[tokio::test]
    async fn get_surfaces_store_failure_on_miss() {
        let (table, store) = table();
        store.set_unavailable(true);
        assert_matches!(table.get("a").await, Err(EngineError::Storage(_)));
    }

    #[tokio::test]
    async fn rejected_update_leaves_record_untouched() {
        let (table, store) = table();
        table.put(record("a", "job1")).await;
        let before = store.upsert_count();

        let result = table
            .update("a", |r| r.complete(json!({}), Utc::now()))
            .await;

        assert_matches!(result, Err(EngineError::Core(CoreError::InvalidState(_))));
        assert_eq!(table.snapshot("a").await.unwrap().status, ExecutionStatus::Pending);
        assert_eq!(store.upsert_count(), before);
    }

    #[tokio::test]
    async fn update_reports_previous_status_and_persists() {
        let (table, store) = table();
        table.put(record("a", "job1")).await;

        let updated = table
            .update("a", |r| r.mark_dispatched("r-1".into(), Utc::now()))
            .await
            .unwrap();

        assert_eq!(updated.previous, ExecutionStatus::Pending);
        assert!(updated.status_changed());
        assert_eq!(store.peek("a").unwrap().status, ExecutionStatus::Running);
    }

    #[tokio::test]
    async fn storage_failure_keeps_memory_transition() {
        let (table, store) = table();
        table.put(record("a", "job1")).await;
        store.set_unavailable(true);

        table.update("a", |r| r.cancel(Utc::now())).await.unwrap();

        assert_eq!(
            table.snapshot("a").await.unwrap().status,
            ExecutionStatus::Cancelled
        );
        assert_eq!(store.peek("a").unwrap().status, ExecutionStatus::Pending);
    }

    #[tokio::test]
    async fn list_by_job_filters_and_limits() {
        let (table, _) = table();
        table.put(record("a", "job1")).await;
        table.put(record("b", "job1")).await;
        table.put(record("c", "job2")).await;

        let listed = table.list_by_job("job1", 1).await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].job_id, "job1");
    }

    #[tokio::test]
    async fn eviction_only_touches_expired_terminal_records() {
        let (table, _) = table();
        table.put(record("live", "job1")).await;
        table.put(record("done", "job1")).await;
        table.update("done", |r| r.cancel(Utc::now())).await.unwrap();

        let cutoff = Utc::now();
        let candidates = table.terminal_before(cutoff).await;
        assert_eq!(candidates, vec!["done".to_string()]);

        assert!(!table.evict_if_expired("live", cutoff).await);
        assert!(table.evict_if_expired("done", cutoff).await);
        assert_eq!(table.len().await, 1);
    }

    #[tokio::test]
    async fn delete_removes_from_memory_only() {
        let (table, store) = table();
        table.put(record("a", "job1")).await;

        assert!(table.delete("a").await);
        assert!(!table.delete("a").await);
        assert!(table.snapshot("a").await.is_none());
        assert!(store.peek("a").is_some());
    }
}
