//! Error types for the streaming client

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Errors surfaced by the streaming client and its transports
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The HTTP client failed to connect or to read the body
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// Any other transport-level failure (used by non-HTTP transports)
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend answered with a non-success status code
    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// No chunk of any kind arrived within the heartbeat timeout
    #[error("no chunk received for {0:?}")]
    HeartbeatTimeout(Duration),

    /// Every reconnection attempt failed
    #[error("reconnection failed after {attempts} attempts")]
    ReconnectionExhausted { attempts: u32 },

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl StreamError {
    /// Classify this error for disconnection bookkeeping.
    pub fn disconnect_reason(&self) -> DisconnectReason {
        match self {
            StreamError::HeartbeatTimeout(_) => DisconnectReason::HeartbeatTimeout,
            StreamError::Status { .. } => DisconnectReason::HttpStatus,
            _ => DisconnectReason::TransportError,
        }
    }
}

/// Why a stream attempt was considered dead
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    /// Connect or read failure
    TransportError,
    /// Backend rejected the request with a non-2xx status
    HttpStatus,
    /// Liveness check expired
    HeartbeatTimeout,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::TransportError => "transport_error",
            DisconnectReason::HttpStatus => "http_status",
            DisconnectReason::HeartbeatTimeout => "heartbeat_timeout",
        }
    }
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;
