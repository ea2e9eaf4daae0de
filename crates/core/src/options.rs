//! Caller-supplied options for a new execution, their defaults and
//! synchronous validation.
//!
//! Everything here runs before a record is created: a validation failure
//! means no execution exists.

use std::time::Duration;

use crate::error::CoreError;

/// Retry budget used when the caller does not set one.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Per-execution timeout used when the caller does not set one (30 minutes).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Upper bound on a caller-supplied retry budget.
pub const MAX_RETRIES_LIMIT: u32 = 50;

/// Upper bound on a per-execution timeout (7 days).
pub const MAX_TIMEOUT: Duration = Duration::from_secs(7 * 24 * 3600);

/// Maximum length of a job definition identifier.
const MAX_JOB_ID_LEN: usize = 255;

/// Default number of executions returned by a history listing.
pub const DEFAULT_LIST_LIMIT: i64 = 50;

/// Maximum number of executions returned by a history listing.
pub const MAX_LIST_LIMIT: i64 = 500;

/// Options accepted by `execute`. Unset fields take engine defaults.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    pub max_retries: Option<u32>,
    pub timeout: Option<Duration>,
    pub metadata: Option<serde_json::Value>,
}

impl ExecuteOptions {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Validate the options and fill unset fields from the given defaults.
    pub fn resolve(
        self,
        default_max_retries: u32,
        default_timeout: Duration,
    ) -> Result<ResolvedOptions, CoreError> {
        let max_retries = self.max_retries.unwrap_or(default_max_retries);
        if max_retries > MAX_RETRIES_LIMIT {
            return Err(CoreError::Validation(format!(
                "max_retries must not exceed {MAX_RETRIES_LIMIT}"
            )));
        }

        let timeout = self.timeout.unwrap_or(default_timeout);
        if timeout.is_zero() {
            return Err(CoreError::Validation(
                "timeout must be greater than zero".to_string(),
            ));
        }
        if timeout > MAX_TIMEOUT {
            return Err(CoreError::Validation(format!(
                "timeout must not exceed {}s",
                MAX_TIMEOUT.as_secs()
            )));
        }

        Ok(ResolvedOptions {
            max_retries,
            timeout,
            metadata: self
                .metadata
                .unwrap_or_else(|| serde_json::Value::Object(Default::default())),
        })
    }
}

/// Options after defaults have been applied.
#[derive(Debug, Clone)]
pub struct ResolvedOptions {
    pub max_retries: u32,
    pub timeout: Duration,
    pub metadata: serde_json::Value,
}

/// Validate a job definition identifier.
///
/// Rules:
/// - Must not be empty or whitespace only.
/// - Must not exceed `MAX_JOB_ID_LEN` characters.
/// - Must not contain `/` (it is interpolated into remote URL paths).
pub fn validate_job_id(job_id: &str) -> Result<(), CoreError> {
    if job_id.trim().is_empty() {
        return Err(CoreError::Validation("job_id must not be empty".to_string()));
    }
    if job_id.len() > MAX_JOB_ID_LEN {
        return Err(CoreError::Validation(format!(
            "job_id must not exceed {MAX_JOB_ID_LEN} characters"
        )));
    }
    if job_id.contains('/') {
        return Err(CoreError::Validation(
            "job_id must not contain '/'".to_string(),
        ));
    }
    Ok(())
}

/// Validate an execution input payload. `null` is accepted as an empty
/// object; anything other than a JSON object is rejected.
pub fn normalize_input(input: serde_json::Value) -> Result<serde_json::Value, CoreError> {
    match input {
        serde_json::Value::Null => Ok(serde_json::Value::Object(Default::default())),
        serde_json::Value::Object(map) => Ok(serde_json::Value::Object(map)),
        other => Err(CoreError::Validation(format!(
            "input must be a JSON object, got {}",
            json_type_name(&other)
        ))),
    }
}

/// Clamp a caller-provided listing limit to `1..=MAX_LIST_LIMIT`.
pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
