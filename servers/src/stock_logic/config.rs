use clap::Parser;
use lib_feed::FeedConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[clap(about = "Stock feed watcher: subscribes to stock codes and logs their quotes", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "STOCK_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "STOCK_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "STOCK_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "STOCK_BASE_URL", help = "Origin of the feed server, e.g. https://feed.example.com")]
    pub base_url: Option<String>,

    #[clap(long, env = "STOCK_SOCKET_PATH", help = "Path of the WebSocket endpoint.")]
    pub socket_path: Option<String>,

    #[clap(long, env = "STOCK_HEALTH_PATH", help = "Path of the HTTP health endpoint; empty disables the probe.")]
    pub health_path: Option<String>,

    #[clap(long, env = "STOCK_AUTO_RECONNECT", help = "Reconnect automatically after unexpected closes (true/false).")]
    pub auto_reconnect: Option<bool>,

    #[clap(long, env = "STOCK_CONNECT_TIMEOUT_MS", help = "Milliseconds to wait for the socket to open.")]
    pub connect_timeout_ms: Option<u64>,

    #[clap(long, env = "STOCK_RECONNECT_DELAY_MS", help = "Fixed delay in milliseconds before a reconnect attempt.")]
    pub reconnect_delay_ms: Option<u64>,

    #[clap(long, env = "STOCK_HEARTBEAT_INTERVAL_MS", help = "Milliseconds between PING frames.")]
    pub heartbeat_interval_ms: Option<u64>,

    #[clap(long, env = "STOCK_STALE_WINDOW_MS", help = "Milliseconds without data before the upstream counts as not producing.")]
    pub stale_window_ms: Option<u64>,

    #[clap(long, env = "STOCK_STATUS_INTERVAL_SECONDS", help = "Seconds between status log lines.")]
    pub status_interval_seconds: Option<u64>,

    #[clap(help = "Stock codes to subscribe to.")]
    #[serde(default)]
    pub codes: Vec<String>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            base_url: other.base_url.or(self.base_url),
            socket_path: other.socket_path.or(self.socket_path),
            health_path: other.health_path.or(self.health_path),
            auto_reconnect: other.auto_reconnect.or(self.auto_reconnect),
            connect_timeout_ms: other.connect_timeout_ms.or(self.connect_timeout_ms),
            reconnect_delay_ms: other.reconnect_delay_ms.or(self.reconnect_delay_ms),
            heartbeat_interval_ms: other.heartbeat_interval_ms.or(self.heartbeat_interval_ms),
            stale_window_ms: other.stale_window_ms.or(self.stale_window_ms),
            status_interval_seconds: other.status_interval_seconds.or(self.status_interval_seconds),
            codes: if other.codes.is_empty() { self.codes } else { other.codes },
        }
    }

    /// The library settings, with library defaults wherever this config is silent.
    pub fn feed_config(&self) -> FeedConfig {
        let defaults = FeedConfig::default();
        FeedConfig {
            base_url: self.base_url.clone().unwrap_or(defaults.base_url),
            socket_path: self.socket_path.clone().unwrap_or(defaults.socket_path),
            health_path: match &self.health_path {
                Some(path) if path.is_empty() => None,
                Some(path) => Some(path.clone()),
                None => defaults.health_path,
            },
            auto_reconnect: self.auto_reconnect.unwrap_or(defaults.auto_reconnect),
            connect_timeout_ms: self.connect_timeout_ms.unwrap_or(defaults.connect_timeout_ms),
            reconnect_delay_ms: self.reconnect_delay_ms.unwrap_or(defaults.reconnect_delay_ms),
            heartbeat_interval_ms: self.heartbeat_interval_ms.unwrap_or(defaults.heartbeat_interval_ms),
            stale_window_ms: self.stale_window_ms.unwrap_or(defaults.stale_window_ms),
            ..defaults
        }
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| PathBuf::from("./logs"))
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    pub fn status_interval_seconds(&self) -> u64 {
        self.status_interval_seconds.unwrap_or(60).max(1)
    }
}

/// Defaults, then the JSON file (stock_watch.conf unless overridden), then
/// environment variables and CLI arguments.
pub fn load_config() -> Config {
    load_config_with(Config::parse())
}

fn load_config_with(cli: Config) -> Config {
    // 1. Load defaults
    let default_config = Config {
        log_dir: Some(PathBuf::from("./logs")),
        log_level: Some("info".to_string()),
        status_interval_seconds: Some(60),
        ..Default::default()
    };

    // 2. Load from config file if present.
    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("stock_watch.conf"));

    let current_config = match read_config_file(&config_file_path) {
        Some(file_config) => default_config.merge(file_config),
        None => default_config,
    };

    // 3. Environment variables and CLI arguments win.
    current_config.merge(cli)
}

fn read_config_file(path: &Path) -> Option<Config> {
    if !path.exists() {
        log::info!("Config file not found at {}. Using defaults and environment/CLI variables.", path.display());
        return None;
    }
    let config_str = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            log::warn!("Failed to read config file {}: {}. Falling back to other sources.", path.display(), e);
            return None;
        }
    };
    match serde_json::from_str::<Config>(&config_str) {
        Ok(config) => Some(config),
        Err(e) => {
            log::warn!("Failed to parse config file {}: {}. Falling back to other sources.", path.display(), e);
            None
        }
    }
}
