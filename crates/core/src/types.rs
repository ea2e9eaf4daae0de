/// Engine-generated execution identifier (opaque, immutable).
pub type ExecutionId = String;

/// Identifier of a job definition owned by the remote engine.
pub type JobId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
