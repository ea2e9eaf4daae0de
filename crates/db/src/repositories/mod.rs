//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async query methods
//! that accept `&PgPool` as the first argument.

pub mod execution_repo;

pub use execution_repo::ExecutionRepo;
