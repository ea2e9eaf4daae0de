//! Process host for the execution engine.
//!
//! The binary in `main.rs` wires configuration, storage, the remote
//! dispatcher and the engine together; this library holds the parts that
//! are worth testing on their own.

pub mod config;
pub mod events;

pub use config::{ConfigError, WorkerConfig};
