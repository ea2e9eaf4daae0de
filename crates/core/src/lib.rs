//! Domain types for the conductor execution engine.
//!
//! This crate has zero internal dependencies so it can be shared by the
//! store, the remote client, the engine and any tooling built on top.

pub mod backoff;
pub mod error;
pub mod execution;
pub mod id;
pub mod options;
pub mod status;
pub mod types;
