//! Delegated execution engine.
//!
//! Accepts a job run, dispatches it to the remote automation engine,
//! tracks it to a terminal status and keeps the durable record in step:
//!
//! - [`ExecutionEngine`]: caller-facing API (`execute`, `get_status`,
//!   `cancel`, `list_executions`) plus recovery and shutdown.
//! - [`table::ExecutionTable`]: the live in-memory view, backed by an
//!   [`ExecutionStore`](conductor_db::ExecutionStore).
//! - `controller` / `monitor`: the per-execution task: dispatch with
//!   retry and backoff, then status polling.
//! - [`sweeper`]: periodic eviction of old terminal records from memory.

pub mod config;
mod controller;
pub mod engine;
pub mod error;
mod monitor;
pub mod sweeper;
pub mod table;

pub use config::EngineConfig;
pub use engine::{ExecutionEngine, ExecutionEngineBuilder};
pub use error::{EngineError, EngineResult};
