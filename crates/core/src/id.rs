//! Execution ID generation.
//!
//! The engine takes an [`IdGenerator`] at construction instead of calling a
//! global helper, so tests can use [`SequentialIdGenerator`] for
//! predictable identifiers.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::ExecutionId;

/// Source of unique execution identifiers.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> ExecutionId;
}

/// Time-ordered UUIDv7 identifiers. The production default.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIdGenerator;

impl IdGenerator for UuidIdGenerator {
    fn next_id(&self) -> ExecutionId {
        uuid::Uuid::now_v7().to_string()
    }
}

/// `"{prefix}-{n}"` identifiers starting at 1.
#[derive(Debug)]
pub struct SequentialIdGenerator {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&self) -> ExecutionId {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}-{n}", self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_ids_are_predictable() {
        let ids = SequentialIdGenerator::new("exec");
        assert_eq!(ids.next_id(), "exec-1");
        assert_eq!(ids.next_id(), "exec-2");
    }

    #[test]
    fn uuid_ids_are_unique() {
        let ids = UuidIdGenerator;
        let a = ids.next_id();
        let b = ids.next_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }
}
