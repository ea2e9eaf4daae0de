//! Execution lifecycle notifications.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`ExecutionEvent`]: one state transition of one execution.

pub mod bus;

pub use bus::{EventBus, ExecutionEvent};
