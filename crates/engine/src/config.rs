use std::str::FromStr;
use std::time::Duration;

use conductor_core::backoff::BackoffPolicy;
use conductor_core::options::{DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT, MAX_TIMEOUT};

/// Engine tuning knobs.
///
/// All fields have defaults suitable for production; tests shrink the
/// intervals to milliseconds.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Executions allowed to dispatch/monitor at the same time. Further
    /// executions wait in `Pending` for a slot.
    pub max_concurrent: usize,
    /// Delay between status polls of a dispatched execution.
    pub poll_interval: Duration,
    /// Delay between dispatch attempts.
    pub backoff: BackoffPolicy,
    /// How long a terminal record stays in memory.
    pub retention: Duration,
    /// How often the retention sweeper runs.
    pub sweep_interval: Duration,
    /// Retry budget when the caller does not set one.
    pub default_max_retries: u32,
    /// Timeout when the caller does not set one.
    pub default_timeout: Duration,
    /// How long `shutdown` waits for running tasks to stop.
    pub shutdown_grace: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 64,
            poll_interval: Duration::from_secs(2),
            backoff: BackoffPolicy::default(),
            retention: Duration::from_secs(24 * 3600),
            sweep_interval: Duration::from_secs(60),
            default_max_retries: DEFAULT_MAX_RETRIES,
            default_timeout: DEFAULT_TIMEOUT,
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                       | Default |
    /// |-------------------------------|---------|
    /// | `ENGINE_MAX_CONCURRENT`       | `64`    |
    /// | `ENGINE_POLL_INTERVAL_MS`     | `2000`  |
    /// | `ENGINE_BACKOFF_UNIT_MS`      | `1000`  |
    /// | `ENGINE_RETENTION_HOURS`      | `24`    |
    /// | `ENGINE_SWEEP_INTERVAL_SECS`  | `60`    |
    /// | `ENGINE_DEFAULT_MAX_RETRIES`  | `3`     |
    /// | `ENGINE_DEFAULT_TIMEOUT_SECS` | `1800`  |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let max_concurrent: usize =
            parse_or(&lookup, "ENGINE_MAX_CONCURRENT", defaults.max_concurrent).max(1);
        let poll_ms: u64 = parse_or(
            &lookup,
            "ENGINE_POLL_INTERVAL_MS",
            defaults.poll_interval.as_millis() as u64,
        );
        let backoff_ms: u64 = parse_or(&lookup, "ENGINE_BACKOFF_UNIT_MS", 1000);
        let retention_hours: u64 = parse_or(&lookup, "ENGINE_RETENTION_HOURS", 24);
        let sweep_secs: u64 = parse_or(
            &lookup,
            "ENGINE_SWEEP_INTERVAL_SECS",
            defaults.sweep_interval.as_secs(),
        );
        let default_max_retries: u32 = parse_or(
            &lookup,
            "ENGINE_DEFAULT_MAX_RETRIES",
            defaults.default_max_retries,
        );
        let timeout_secs: u64 = parse_or(
            &lookup,
            "ENGINE_DEFAULT_TIMEOUT_SECS",
            defaults.default_timeout.as_secs(),
        );

        Self {
            max_concurrent,
            poll_interval: Duration::from_millis(poll_ms.max(1)),
            backoff: BackoffPolicy::linear(Duration::from_millis(backoff_ms)),
            retention: Duration::from_secs(retention_hours * 3600),
            sweep_interval: Duration::from_secs(sweep_secs.max(1)),
            default_max_retries,
            default_timeout: Duration::from_secs(timeout_secs.max(1)).min(MAX_TIMEOUT),
            shutdown_grace: defaults.shutdown_grace,
        }
    }
}

/// Parse `key` if present, warning and falling back to `default` on
/// malformed values.
fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, value = %raw, "Invalid engine setting, using default");
                default
            }
        },
        None => default,
    }
}
