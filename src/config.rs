//! Client configuration
//!
//! Priority: env var > YAML > default. The YAML file is optional; a missing
//! or unparsable file falls back to defaults.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StreamError};
use crate::stream::heartbeat::{DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_HEARTBEAT_TIMEOUT};
use crate::stream::reconnect::{
    DEFAULT_BACKOFF_FACTOR, DEFAULT_BASE_RECONNECT_DELAY, DEFAULT_MAX_RECONNECT_ATTEMPTS,
    DEFAULT_MAX_RECONNECT_DELAY,
};
use crate::stream::{HeartbeatConfig, ReconnectPolicy};

pub const DEFAULT_CONFIG_FILE: &str = "chat-stream.yaml";
pub const DEFAULT_ENDPOINT: &str = "http://localhost:3000/api/chat/stream";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;
pub const DEFAULT_METRICS_PREFIX: &str = "chat_stream";

// ============================================================================
// YAML config structs
// ============================================================================

/// Top-level YAML configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct YamlConfig {
    pub client: ClientYamlConfig,
    pub reconnect: ReconnectYamlConfig,
    pub heartbeat: HeartbeatYamlConfig,
    pub metrics: MetricsYamlConfig,
}

/// Connection section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientYamlConfig {
    pub endpoint: String,
    pub user_id: Option<String>,
    pub resilience: bool,
    pub connect_timeout_ms: u64,
    pub max_line_bytes: usize,
}

impl Default for ClientYamlConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.into(),
            user_id: None,
            resilience: true,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT.as_millis() as u64,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

/// Backoff section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectYamlConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
}

impl Default for ReconnectYamlConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_RECONNECT_DELAY.as_millis() as u64,
            max_delay_ms: DEFAULT_MAX_RECONNECT_DELAY.as_millis() as u64,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
        }
    }
}

/// Liveness section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatYamlConfig {
    pub interval_ms: u64,
    pub timeout_ms: u64,
}

impl Default for HeartbeatYamlConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_HEARTBEAT_INTERVAL.as_millis() as u64,
            timeout_ms: DEFAULT_HEARTBEAT_TIMEOUT.as_millis() as u64,
        }
    }
}

/// Metrics export section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsYamlConfig {
    pub prefix: String,
}

impl Default for MetricsYamlConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_METRICS_PREFIX.into(),
        }
    }
}

// ============================================================================
// Runtime config
// ============================================================================

/// Configuration consumed by [`StreamClient`](crate::StreamClient)
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub endpoint: String,
    pub user_id: Option<String>,
    /// Heartbeat monitoring plus automatic reconnection
    pub resilience: bool,
    pub reconnect: ReconnectPolicy,
    pub heartbeat: HeartbeatConfig,
    pub connect_timeout: Duration,
    pub max_line_bytes: usize,
    pub metrics_prefix: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from_yaml(YamlConfig::default())
    }
}

fn env_parse<T: std::str::FromStr>(var: &str) -> Option<T> {
    std::env::var(var).ok().and_then(|s| s.parse().ok())
}

fn env_bool(var: &str) -> Option<bool> {
    std::env::var(var)
        .ok()
        .and_then(|s| match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
}

impl ClientConfig {
    /// Load configuration from environment variables only.
    pub fn from_env() -> Self {
        Self::from_yaml_and_env(None)
    }

    /// Load configuration from an optional YAML file, then override with env vars.
    ///
    /// If `yaml_path` is None, tries `chat-stream.yaml` in CWD.
    pub fn from_yaml_and_env(yaml_path: Option<&Path>) -> Self {
        let mut yaml = Self::load_yaml(yaml_path);

        let client = &mut yaml.client;
        if let Ok(endpoint) = std::env::var("CHAT_STREAM_ENDPOINT") {
            client.endpoint = endpoint;
        }
        if let Some(user_id) = std::env::var("CHAT_STREAM_USER_ID")
            .ok()
            .filter(|s| !s.is_empty())
        {
            client.user_id = Some(user_id);
        }
        client.resilience = env_bool("CHAT_STREAM_RESILIENCE").unwrap_or(client.resilience);
        client.connect_timeout_ms =
            env_parse("CHAT_STREAM_CONNECT_TIMEOUT_MS").unwrap_or(client.connect_timeout_ms);

        let reconnect = &mut yaml.reconnect;
        reconnect.max_attempts =
            env_parse("CHAT_STREAM_MAX_RECONNECT_ATTEMPTS").unwrap_or(reconnect.max_attempts);
        reconnect.base_delay_ms =
            env_parse("CHAT_STREAM_BASE_RECONNECT_DELAY_MS").unwrap_or(reconnect.base_delay_ms);
        reconnect.max_delay_ms =
            env_parse("CHAT_STREAM_MAX_RECONNECT_DELAY_MS").unwrap_or(reconnect.max_delay_ms);
        reconnect.backoff_factor =
            env_parse("CHAT_STREAM_BACKOFF_FACTOR").unwrap_or(reconnect.backoff_factor);

        let heartbeat = &mut yaml.heartbeat;
        heartbeat.interval_ms =
            env_parse("CHAT_STREAM_HEARTBEAT_INTERVAL_MS").unwrap_or(heartbeat.interval_ms);
        heartbeat.timeout_ms =
            env_parse("CHAT_STREAM_HEARTBEAT_TIMEOUT_MS").unwrap_or(heartbeat.timeout_ms);

        if let Ok(prefix) = std::env::var("CHAT_STREAM_METRICS_PREFIX") {
            yaml.metrics.prefix = prefix;
        }

        Self::from_yaml(yaml)
    }

    /// Try to load and parse a YAML config file. Returns defaults on any failure.
    pub fn load_yaml(yaml_path: Option<&Path>) -> YamlConfig {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);
        let path = yaml_path.unwrap_or(default_path);

        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    YamlConfig::default()
                }
            },
            Err(_) => {
                tracing::debug!(
                    "No config file at {}, using env vars / defaults",
                    path.display()
                );
                YamlConfig::default()
            }
        }
    }

    pub fn from_yaml(yaml: YamlConfig) -> Self {
        Self {
            endpoint: yaml.client.endpoint,
            user_id: yaml.client.user_id,
            resilience: yaml.client.resilience,
            reconnect: ReconnectPolicy {
                max_attempts: yaml.reconnect.max_attempts,
                base_delay: Duration::from_millis(yaml.reconnect.base_delay_ms),
                max_delay: Duration::from_millis(yaml.reconnect.max_delay_ms),
                backoff_factor: yaml.reconnect.backoff_factor,
            },
            heartbeat: HeartbeatConfig {
                interval: Duration::from_millis(yaml.heartbeat.interval_ms),
                timeout: Duration::from_millis(yaml.heartbeat.timeout_ms),
            },
            connect_timeout: Duration::from_millis(yaml.client.connect_timeout_ms),
            max_line_bytes: yaml.client.max_line_bytes,
            metrics_prefix: yaml.metrics.prefix,
        }
    }

    /// Inverse of [`from_yaml`](Self::from_yaml), for printing the effective config
    pub fn to_yaml(&self) -> YamlConfig {
        YamlConfig {
            client: ClientYamlConfig {
                endpoint: self.endpoint.clone(),
                user_id: self.user_id.clone(),
                resilience: self.resilience,
                connect_timeout_ms: self.connect_timeout.as_millis() as u64,
                max_line_bytes: self.max_line_bytes,
            },
            reconnect: ReconnectYamlConfig {
                max_attempts: self.reconnect.max_attempts,
                base_delay_ms: self.reconnect.base_delay.as_millis() as u64,
                max_delay_ms: self.reconnect.max_delay.as_millis() as u64,
                backoff_factor: self.reconnect.backoff_factor,
            },
            heartbeat: HeartbeatYamlConfig {
                interval_ms: self.heartbeat.interval.as_millis() as u64,
                timeout_ms: self.heartbeat.timeout.as_millis() as u64,
            },
            metrics: MetricsYamlConfig {
                prefix: self.metrics_prefix.clone(),
            },
        }
    }

    /// Reject values the client cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(StreamError::Config("endpoint is empty".into()));
        }
        if self.heartbeat.interval.is_zero() {
            return Err(StreamError::Config(
                "heartbeat interval must be positive".into(),
            ));
        }
        if !self.reconnect.backoff_factor.is_finite() || self.reconnect.backoff_factor < 1.0 {
            return Err(StreamError::Config(format!(
                "backoff factor must be >= 1.0, got {}",
                self.reconnect.backoff_factor
            )));
        }
        if self.max_line_bytes == 0 {
            return Err(StreamError::Config("max_line_bytes must be positive".into()));
        }
        if self.metrics_prefix.is_empty()
            || !self
                .metrics_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(StreamError::Config(format!(
                "invalid metrics prefix {:?}",
                self.metrics_prefix
            )));
        }
        Ok(())
    }
}
