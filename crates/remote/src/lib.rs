//! Client side of the external automation engine.
//!
//! The engine that actually runs job graphs is out of our hands: we can
//! submit a run, poll its status, and enable/disable a job definition.
//! [`RemoteDispatcher`] is that boundary; [`HttpDispatcher`] speaks its
//! REST API over [`reqwest`].

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod http;

pub use config::RemoteConfig;
pub use dispatcher::{RemoteDispatcher, RemoteState, RemoteStatus};
pub use error::RemoteError;
pub use http::HttpDispatcher;
