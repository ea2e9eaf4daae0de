/// Errors from talking to the remote engine.
///
/// All of these are transport or protocol failures. A job that ran and
/// failed is reported as [`RemoteState::Error`](crate::RemoteState::Error)
/// inside a successful status response, not as a `RemoteError`.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The remote engine returned a non-2xx status code.
    #[error("Remote API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// A 2xx response whose body did not have the expected shape.
    #[error("Invalid response from remote engine: {0}")]
    InvalidResponse(String),
}
