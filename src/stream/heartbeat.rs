//! Heartbeat-based liveness detection
//!
//! Any admitted chunk counts as a heartbeat. The connection loop polls
//! [`HeartbeatMonitor::is_expired`] on every tick of [`HeartbeatConfig::interval`].

use std::time::Duration;
use tokio::time::Instant;

/// Default polling interval (server cadence is 30s)
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
/// Default timeout: 1.5x the server heartbeat cadence
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(45);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// How often liveness is checked
    pub interval: Duration,
    /// Silence longer than this declares the connection dead
    pub timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_HEARTBEAT_INTERVAL,
            timeout: DEFAULT_HEARTBEAT_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HeartbeatMonitor {
    config: HeartbeatConfig,
    last_heartbeat: Option<Instant>,
    running: bool,
}

impl HeartbeatMonitor {
    pub fn new(config: HeartbeatConfig) -> Self {
        Self {
            config,
            last_heartbeat: None,
            running: false,
        }
    }

    pub fn config(&self) -> HeartbeatConfig {
        self.config
    }

    /// Begin monitoring an attempt; the clock starts now.
    pub fn start(&mut self, now: Instant) {
        self.running = true;
        self.last_heartbeat = Some(now);
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Record proof of life
    pub fn touch(&mut self, now: Instant) {
        self.last_heartbeat = Some(now);
    }

    /// Time since the last chunk, if one was ever seen
    pub fn age(&self, now: Instant) -> Option<Duration> {
        self.last_heartbeat
            .map(|last| now.saturating_duration_since(last))
    }

    /// True when monitoring and the silence exceeds the timeout
    pub fn is_expired(&self, now: Instant) -> bool {
        self.running
            && self
                .age(now)
                .map(|age| age > self.config.timeout)
                .unwrap_or(false)
    }
}
