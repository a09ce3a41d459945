use std::time::Duration;

use url::Url;

use crate::error::{ConsoleError, Result};
use crate::filter::FilterState;
use crate::supervisor::{BackoffPolicy, BACKOFF_SCHEDULE, HEARTBEAT_INTERVAL, MAX_RECONNECT_ATTEMPTS};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_STREAM_PATH: &str = "/api/ws/logs";
pub const DEFAULT_SNAPSHOT_LINES: usize = 100;
pub const DEFAULT_BATCH_SIZE: u32 = 100;
pub const DEFAULT_METRICS_POLL: Duration = Duration::from_secs(5);
pub const DEFAULT_HISTORY_SECONDS: u32 = 300;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
/// Largest accepted `buffer_capacity`.
pub const MAX_BUFFER_CAPACITY: usize = 100_000;
/// Largest accepted `metrics_window`, one hour of 1s samples.
pub const MAX_METRICS_WINDOW: usize = 3_600;

#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleConfig {
    pub base_url: String,
    pub stream_path: String,
    pub token: Option<String>,
    pub snapshot_lines: usize,
    pub buffer_capacity: usize,
    pub metrics_window: usize,
    pub metrics_poll_interval: Duration,
    pub metrics_history_seconds: u32,
    pub heartbeat_interval: Duration,
    pub backoff: Vec<Duration>,
    pub max_reconnect_attempts: u32,
    pub initial_filter: FilterState,
    pub batch_size: u32,
    pub request_timeout: Duration,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            stream_path: DEFAULT_STREAM_PATH.to_string(),
            token: None,
            snapshot_lines: DEFAULT_SNAPSHOT_LINES,
            buffer_capacity: crate::buffer::MAX_CAPACITY,
            metrics_window: crate::metrics::METRICS_WINDOW,
            metrics_poll_interval: DEFAULT_METRICS_POLL,
            metrics_history_seconds: DEFAULT_HISTORY_SECONDS,
            heartbeat_interval: HEARTBEAT_INTERVAL,
            backoff: BACKOFF_SCHEDULE.to_vec(),
            max_reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
            initial_filter: FilterState::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_var(key).and_then(|s| s.trim().parse().ok())
}

impl ConsoleConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(url) = env_var("PROXY_CONSOLE_URL") {
            config.base_url = url;
        }
        config.token = env_var("PROXY_CONSOLE_TOKEN");
        if let Some(capacity) = env_parse("PROXY_CONSOLE_BUFFER_CAPACITY") {
            config.buffer_capacity = capacity;
        }
        if let Some(lines) = env_parse("PROXY_CONSOLE_SNAPSHOT_LINES") {
            config.snapshot_lines = lines;
        }
        config
    }

    pub fn validate(&self) -> Result<()> {
        let base = self.base()?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(invalid(format!(
                "base url must be http or https, got {}",
                base.scheme()
            )));
        }
        if self.backoff.is_empty() {
            return Err(invalid("backoff schedule is empty"));
        }
        if self.buffer_capacity == 0 || self.metrics_window == 0 {
            return Err(invalid("buffer capacities must be non-zero"));
        }
        if self.buffer_capacity > MAX_BUFFER_CAPACITY {
            return Err(invalid(format!(
                "buffer capacity {} exceeds {MAX_BUFFER_CAPACITY}",
                self.buffer_capacity
            )));
        }
        if self.metrics_window > MAX_METRICS_WINDOW {
            return Err(invalid(format!(
                "metrics window {} exceeds {MAX_METRICS_WINDOW}",
                self.metrics_window
            )));
        }
        if self.heartbeat_interval.is_zero() || self.metrics_poll_interval.is_zero() {
            return Err(invalid("timer intervals must be non-zero"));
        }
        Ok(())
    }

    /// Snapshot size, clamped to what the tail endpoint accepts.
    pub fn snapshot_lines(&self) -> usize {
        self.snapshot_lines.clamp(1, 1000)
    }

    /// History window, clamped to what the history endpoints accept.
    pub fn history_seconds(&self) -> u32 {
        self.metrics_history_seconds.clamp(60, 3600)
    }

    pub fn batch_size(&self) -> u32 {
        self.batch_size.clamp(10, 1000)
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(self.backoff.clone(), self.max_reconnect_attempts)
    }

    /// Absolute URL of a REST path under the base URL.
    pub fn rest_url(&self, path: &str) -> Result<Url> {
        let base = self.base()?;
        base.join(path).map_err(|source| ConsoleError::InvalidUrl {
            url: path.to_string(),
            source,
        })
    }

    /// WebSocket URL of the log stream. The backend applies `level`, `search`
    /// and `batch_size` from the query string when it accepts the socket.
    pub fn stream_url(&self, filter: &FilterState) -> Result<Url> {
        let mut url = self.rest_url(&self.stream_path)?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| invalid(format!("cannot derive websocket url from {url}")))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("level", filter.level_threshold.as_str());
            query.append_pair("batch_size", &self.batch_size().to_string());
            if let Some(search) = filter.search() {
                query.append_pair("search", &search);
            }
        }
        Ok(url)
    }

    pub fn bearer(&self) -> Option<String> {
        self.token.as_ref().map(|token| format!("Bearer {token}"))
    }

    fn base(&self) -> Result<Url> {
        Url::parse(&self.base_url).map_err(|source| ConsoleError::InvalidUrl {
            url: self.base_url.clone(),
            source,
        })
    }
}

fn invalid(details: impl Into<String>) -> ConsoleError {
    ConsoleError::InvalidConfig {
        details: details.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Level;

    #[test]
    fn test_defaults_are_valid() {
        let config = ConsoleConfig::default();
        config.validate().unwrap();
        assert_eq!(config.buffer_capacity, 1000);
        assert_eq!(config.metrics_window, 60);
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.backoff.len(), 5);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = ConsoleConfig {
            base_url: "ftp://example.com".into(),
            ..ConsoleConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ConsoleConfig {
            backoff: Vec::new(),
            ..ConsoleConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ConsoleConfig {
            buffer_capacity: 0,
            ..ConsoleConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ConsoleConfig {
            base_url: "not a url".into(),
            ..ConsoleConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConsoleError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_oversized_capacities() {
        let config = ConsoleConfig {
            buffer_capacity: usize::MAX,
            ..ConsoleConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConsoleError::InvalidConfig { .. })
        ));

        let config = ConsoleConfig {
            metrics_window: usize::MAX,
            ..ConsoleConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConsoleError::InvalidConfig { .. })
        ));

        let config = ConsoleConfig {
            buffer_capacity: MAX_BUFFER_CAPACITY,
            metrics_window: MAX_METRICS_WINDOW,
            ..ConsoleConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_stream_url_carries_filter() {
        let config = ConsoleConfig {
            base_url: "https://proxy.example.com".into(),
            ..ConsoleConfig::default()
        };
        let filter = FilterState {
            level_threshold: Level::Warning,
            search_text: "bad gateway".into(),
            streaming_enabled: true,
        };
        let url = config.stream_url(&filter).unwrap();
        assert_eq!(url.scheme(), "wss");
        assert_eq!(url.path(), "/api/ws/logs");
        let query = url.query().unwrap();
        assert!(query.contains("level=WARNING"));
        assert!(query.contains("search=bad+gateway"));
        assert!(query.contains("batch_size=100"));
    }

    #[test]
    fn test_clamps() {
        let config = ConsoleConfig {
            snapshot_lines: 50_000,
            metrics_history_seconds: 5,
            batch_size: 1,
            ..ConsoleConfig::default()
        };
        assert_eq!(config.snapshot_lines(), 1000);
        assert_eq!(config.history_seconds(), 60);
        assert_eq!(config.batch_size(), 10);
    }

    #[test]
    fn test_rest_url_joins_path() {
        let config = ConsoleConfig::default();
        let url = config.rest_url("/api/logs/tail").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8000/api/logs/tail");
    }
}
