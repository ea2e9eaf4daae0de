use async_trait::async_trait;

use crate::error::RemoteError;

/// Remote-reported state of a dispatched run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteState {
    Running,
    Success,
    Error,
    /// Any value we do not recognise (`waiting`, `new`, ...). Treated as
    /// still in progress.
    Other(String),
}

impl RemoteState {
    /// Parse the status string reported by the remote engine.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "running" => Self::Running,
            "success" => Self::Success,
            "error" => Self::Error,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }
}

/// Result of a fetch-status call.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteStatus {
    pub state: RemoteState,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl RemoteStatus {
    pub fn running() -> Self {
        Self {
            state: RemoteState::Running,
            output: None,
            error: None,
        }
    }

    pub fn success(output: serde_json::Value) -> Self {
        Self {
            state: RemoteState::Success,
            output: Some(output),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            state: RemoteState::Error,
            output: None,
            error: Some(message.into()),
        }
    }
}

/// The four operations the engine consumes from the remote engine.
#[async_trait]
pub trait RemoteDispatcher: Send + Sync {
    /// Start a run of `job_id` with `input`; returns the remote execution id.
    async fn submit(&self, job_id: &str, input: &serde_json::Value) -> Result<String, RemoteError>;

    /// Current status of a run started by [`submit`](Self::submit).
    async fn fetch_status(&self, remote_execution_id: &str) -> Result<RemoteStatus, RemoteError>;

    /// Activate a job definition.
    async fn enable(&self, job_id: &str) -> Result<(), RemoteError>;

    /// Deactivate a job definition.
    async fn disable(&self, job_id: &str) -> Result<(), RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_states_case_insensitively() {
        assert_eq!(RemoteState::parse("running"), RemoteState::Running);
        assert_eq!(RemoteState::parse("SUCCESS"), RemoteState::Success);
        assert_eq!(RemoteState::parse(" error "), RemoteState::Error);
    }

    #[test]
    fn unknown_state_is_not_terminal() {
        let state = RemoteState::parse("waiting");
        assert_eq!(state, RemoteState::Other("waiting".into()));
        assert!(!state.is_terminal());
        assert!(!RemoteState::Running.is_terminal());
        assert!(RemoteState::Success.is_terminal());
    }
}
