use conductor_engine::EngineConfig;
use conductor_remote::RemoteConfig;

/// Default size of the database connection pool.
const DEFAULT_MAX_CONNECTIONS: u32 = 20;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
}

/// Everything the worker process needs at start-up.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    /// Emit JSON log lines instead of human-readable ones.
    pub log_json: bool,
    pub remote: RemoteConfig,
    pub engine: EngineConfig,
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                    | Default  |
    /// |----------------------------|----------|
    /// | `DATABASE_URL`             | required |
    /// | `DATABASE_MAX_CONNECTIONS` | `20`     |
    /// | `LOG_FORMAT`               | `text`   |
    ///
    /// plus the `REMOTE_*` and `ENGINE_*` variables read by
    /// [`RemoteConfig`] and [`EngineConfig`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let database_max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    tracing::warn!(value = %raw, "Invalid DATABASE_MAX_CONNECTIONS, using default");
                    DEFAULT_MAX_CONNECTIONS
                }
            },
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let log_json = lookup("LOG_FORMAT").is_some_and(|v| v.eq_ignore_ascii_case("json"));

        Ok(Self {
            database_url,
            database_max_connections,
            log_json,
            remote: RemoteConfig::from_lookup(&lookup),
            engine: EngineConfig::from_lookup(&lookup),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn database_url_is_required() {
        let err = WorkerConfig::from_lookup(env(&[])).unwrap_err();
        assert_eq!(err.to_string(), "DATABASE_URL must be set");
    }

    #[test]
    fn nested_configs_read_the_same_source() {
        let config = WorkerConfig::from_lookup(env(&[
            ("DATABASE_URL", "postgres://localhost/conductor"),
            ("DATABASE_MAX_CONNECTIONS", "5"),
            ("LOG_FORMAT", "JSON"),
            ("REMOTE_BASE_URL", "http://automation:5678"),
            ("ENGINE_POLL_INTERVAL_MS", "500"),
        ]))
        .unwrap();

        assert_eq!(config.database_max_connections, 5);
        assert!(config.log_json);
        assert_eq!(config.remote.base_url, "http://automation:5678");
        assert_eq!(config.engine.poll_interval, Duration::from_millis(500));
    }

    #[test]
    fn bad_pool_size_falls_back() {
        let config = WorkerConfig::from_lookup(env(&[
            ("DATABASE_URL", "postgres://localhost/conductor"),
            ("DATABASE_MAX_CONNECTIONS", "0"),
        ]))
        .unwrap();
        assert_eq!(config.database_max_connections, 20);
        assert!(!config.log_json);
    }
}
