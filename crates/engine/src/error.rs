use conductor_core::error::CoreError;
use conductor_db::StoreError;
use conductor_remote::RemoteError;

/// Errors returned synchronously by the engine API.
///
/// Failures inside a running execution (dispatch, polling, job errors,
/// timeouts) never surface here; they are recorded on the execution and
/// read back through `get_status`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Validation, not-found and invalid-state errors.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A store-backed read failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// A pass-through call to the remote engine failed.
    #[error("Remote engine error: {0}")]
    Remote(#[from] RemoteError),
}

/// Convenience alias for engine API results.
pub type EngineResult<T> = Result<T, EngineError>;
