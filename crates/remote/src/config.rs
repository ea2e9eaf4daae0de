use std::time::Duration;

/// Connection settings for the remote automation engine.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Base HTTP URL, e.g. `http://localhost:5678`. No trailing slash.
    pub base_url: String,
    /// Value sent in the `X-API-KEY` header, if any.
    pub api_key: Option<String>,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5678".to_string(),
            api_key: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl RemoteConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                       | Default                 |
    /// |-------------------------------|-------------------------|
    /// | `REMOTE_BASE_URL`             | `http://localhost:5678` |
    /// | `REMOTE_API_KEY`              | unset                   |
    /// | `REMOTE_REQUEST_TIMEOUT_SECS` | `30`                    |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let base_url = lookup("REMOTE_BASE_URL")
            .map(|v| v.trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.base_url);

        let api_key = lookup("REMOTE_API_KEY").filter(|v| !v.is_empty());

        let request_timeout = match lookup("REMOTE_REQUEST_TIMEOUT_SECS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    tracing::warn!(value = %raw, "Invalid REMOTE_REQUEST_TIMEOUT_SECS, using default");
                    defaults.request_timeout
                }
            },
            None => defaults.request_timeout,
        };

        Self {
            base_url,
            api_key,
            request_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_unset() {
        let config = RemoteConfig::from_lookup(|_| None);
        assert_eq!(config.base_url, "http://localhost:5678");
        assert!(config.api_key.is_none());
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn trailing_slash_and_empty_key_are_normalised() {
        let config = RemoteConfig::from_lookup(|key| match key {
            "REMOTE_BASE_URL" => Some("https://automation.internal/".into()),
            "REMOTE_API_KEY" => Some(String::new()),
            "REMOTE_REQUEST_TIMEOUT_SECS" => Some("zero".into()),
            _ => None,
        });
        assert_eq!(config.base_url, "https://automation.internal");
        assert!(config.api_key.is_none());
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }
}
