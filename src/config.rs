//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::scheduler::ScheduleConfig;
use crate::stream::HubConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub stream: StreamConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// How long open streams may take to close after a shutdown signal
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_shutdown_grace() -> u64 {
    5
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

impl ServerConfig {
    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Sampling cadence and per-client buffering
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_sample_interval")]
    pub sample_interval_ms: u64,

    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Frames buffered per client; further frames are dropped
    #[serde(default = "default_client_buffer")]
    pub client_buffer: usize,

    /// Commands queued for the hub task
    #[serde(default = "default_hub_mailbox")]
    pub hub_mailbox: usize,
}

fn default_sample_interval() -> u64 {
    250
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_client_buffer() -> usize {
    8
}

fn default_hub_mailbox() -> usize {
    64
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: default_sample_interval(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            client_buffer: default_client_buffer(),
            hub_mailbox: default_hub_mailbox(),
        }
    }
}

impl StreamConfig {
    pub fn hub(&self) -> HubConfig {
        HubConfig {
            client_buffer: self.client_buffer,
            mailbox: self.hub_mailbox,
        }
    }

    /// Timer periods; zero values fall back to the defaults
    pub fn schedule(&self) -> ScheduleConfig {
        let defaults = ScheduleConfig::default();
        ScheduleConfig {
            sample_interval: match self.sample_interval_ms {
                0 => defaults.sample_interval,
                ms => Duration::from_millis(ms),
            },
            heartbeat_interval: match self.heartbeat_interval_secs {
                0 => defaults.heartbeat_interval,
                secs => Duration::from_secs(secs),
            },
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        Self::load_first(&Self::default_paths())
    }

    /// Config file locations searched by [`Config::load_default`], in order
    pub fn default_paths() -> Vec<PathBuf> {
        [
            dirs::config_dir().map(|p| p.join("hoststream").join("config.toml")),
            Some(PathBuf::from("/etc/hoststream/config.toml")),
            Some(PathBuf::from("./hoststream.toml")),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Load the first of `paths` that exists and parses. Files that fail to
    /// load are logged and skipped.
    pub fn load_first(paths: &[PathBuf]) -> Self {
        for path in paths {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(port) = var("PORT") {
            match port.parse() {
                Ok(p) => self.server.port = p,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid PORT"),
            }
        }
        if let Some(host) = var("HOSTSTREAM_HOST") {
            self.server.host = host;
        }

        if let Some(level) = var("HOSTSTREAM_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("HOSTSTREAM_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Hoststream Configuration
#
# Environment variables override these settings:
# - PORT
# - HOSTSTREAM_HOST
# - HOSTSTREAM_LOG_LEVEL
# - HOSTSTREAM_LOG_FORMAT

[server]
# Address to bind
host = "0.0.0.0"

# Port to listen on
port = 8080

# Seconds open streams get to close after SIGINT/SIGTERM
shutdown_grace_secs = 5

[stream]
# How often metrics are sampled and pushed (ms)
sample_interval_ms = 250

# How often a keepalive comment is sent (seconds)
heartbeat_interval_secs = 30

# Frames buffered per client before updates are dropped
client_buffer = 8

# Commands queued for the broadcast hub
hub_mailbox = 64

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
