use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::core::errors::FeedError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error occurred: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Settings of one feed client. Every field has a default, so a JSON file only
/// needs the keys it wants to change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeedConfig {
    /// Origin of the feed server; `http(s)` maps to `ws(s)` for the socket.
    pub base_url: String,
    pub socket_path: String,
    /// Plain HTTP health endpoint probed before each attempt; `None` disables it.
    pub health_path: Option<String>,
    pub auto_reconnect: bool,
    pub connect_timeout_ms: u64,
    pub reconnect_delay_ms: u64,
    /// Delay between the disconnect and connect halves of `reconnect()`.
    pub restart_delay_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub stale_window_ms: u64,
    /// Pause after `CONNECTION_ESTABLISHED` before replaying subscriptions.
    pub resubscribe_delay_ms: u64,
    pub health_timeout_ms: u64,
    /// Capacity of the broadcast stream of changed quotes.
    pub update_buffer: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            socket_path: "/ws/stock".to_string(),
            health_path: Some("/health".to_string()),
            auto_reconnect: true,
            connect_timeout_ms: 10_000,
            reconnect_delay_ms: 3_000,
            restart_delay_ms: 100,
            heartbeat_interval_ms: 10_000,
            stale_window_ms: 30_000,
            resubscribe_delay_ms: 100,
            health_timeout_ms: 3_000,
            update_buffer: 1_024,
        }
    }
}

impl FeedConfig {
    /// Reads a JSON config file; missing keys fall back to defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config: FeedConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_url().map_err(|e| ConfigError::Invalid(e.to_string()))?;
        let non_zero = [
            ("connectTimeoutMs", self.connect_timeout_ms),
            ("heartbeatIntervalMs", self.heartbeat_interval_ms),
            ("staleWindowMs", self.stale_window_ms),
            ("healthTimeoutMs", self.health_timeout_ms),
        ];
        for (name, value) in non_zero {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be greater than zero", name)));
            }
        }
        if self.update_buffer == 0 {
            return Err(ConfigError::Invalid("updateBuffer must be greater than zero".to_string()));
        }
        Ok(())
    }

    /// The WebSocket URL: scheme follows the base URL's (`https` → `wss`).
    pub fn socket_url(&self) -> Result<Url, FeedError> {
        let mut url = self.base()?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(FeedError::Endpoint(format!("unsupported scheme `{}`", other))),
        };
        url.set_scheme(scheme)
            .map_err(|_| FeedError::Endpoint(format!("cannot switch {} to {}", self.base_url, scheme)))?;
        url.set_path(&self.socket_path);
        Ok(url)
    }

    /// The health endpoint on the same origin over plain HTTP(S).
    pub fn health_url(&self) -> Result<Option<Url>, FeedError> {
        let Some(path) = self.health_path.as_deref().filter(|p| !p.is_empty()) else {
            return Ok(None);
        };
        let mut url = self.base()?;
        let scheme = match url.scheme() {
            "ws" | "http" => "http",
            _ => "https",
        };
        url.set_scheme(scheme)
            .map_err(|_| FeedError::Endpoint(format!("cannot switch {} to {}", self.base_url, scheme)))?;
        url.set_path(path);
        Ok(Some(url))
    }

    fn base(&self) -> Result<Url, FeedError> {
        Url::parse(&self.base_url).map_err(|e| FeedError::Endpoint(format!("{}: {}", self.base_url, e)))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn stale_window(&self) -> Duration {
        Duration::from_millis(self.stale_window_ms)
    }

    pub fn resubscribe_delay(&self) -> Duration {
        Duration::from_millis(self.resubscribe_delay_ms)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn socket_scheme_follows_base_scheme() {
        let mut config = FeedConfig::default();
        assert_eq!(config.socket_url().unwrap().as_str(), "ws://localhost:8080/ws/stock");

        config.base_url = "https://feed.example.com".into();
        assert_eq!(config.socket_url().unwrap().as_str(), "wss://feed.example.com/ws/stock");
        assert_eq!(config.health_url().unwrap().unwrap().as_str(), "https://feed.example.com/health");

        config.base_url = "ftp://feed.example.com".into();
        assert!(matches!(config.socket_url(), Err(FeedError::Endpoint(_))));
    }

    #[test]
    fn health_probe_can_be_disabled() {
        let config = FeedConfig { health_path: None, ..FeedConfig::default() };
        assert_eq!(config.health_url().unwrap(), None);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"baseUrl":"https://feed.example.com","staleWindowMs":5000}}"#).unwrap();

        let config = FeedConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.base_url, "https://feed.example.com");
        assert_eq!(config.stale_window(), Duration::from_secs(5));
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(10));
        assert!(config.auto_reconnect);
    }

    #[test]
    fn zero_durations_are_rejected() {
        let config = FeedConfig { heartbeat_interval_ms: 0, ..FeedConfig::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
