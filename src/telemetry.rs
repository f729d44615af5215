//! Connection telemetry and Prometheus text exposition

use serde::Serialize;
use std::fmt::Write;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::DisconnectReason;

/// Lifecycle counters owned by the client
#[derive(Debug, Clone)]
pub struct Telemetry {
    connections: u64,
    disconnections: u64,
    reconnections: u64,
    total_reconnect_time: Duration,
    last_disconnect_reason: Option<DisconnectReason>,
    uptime_start: Instant,
}

/// Point-in-time view returned by `StreamClient::telemetry`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    pub connections: u64,
    pub disconnections: u64,
    pub reconnections: u64,
    pub total_reconnect_time_ms: u64,
    pub average_reconnect_time_ms: u64,
    pub last_disconnect_reason: Option<DisconnectReason>,
    pub uptime_ms: u64,
    /// Percentage in `[0, 100]`
    pub connection_success_rate: f64,
    pub last_heartbeat_age_ms: Option<u64>,
    pub is_streaming: bool,
    pub reconnect_attempts: u32,
}

impl Telemetry {
    pub fn new(now: Instant) -> Self {
        Self {
            connections: 0,
            disconnections: 0,
            reconnections: 0,
            total_reconnect_time: Duration::ZERO,
            last_disconnect_reason: None,
            uptime_start: now,
        }
    }

    /// One underlying request was issued
    pub fn record_connection(&mut self) {
        self.connections += 1;
    }

    pub fn record_disconnection(&mut self, reason: DisconnectReason) {
        self.disconnections += 1;
        self.last_disconnect_reason = Some(reason);
    }

    pub fn record_reconnection(&mut self, took: Duration) {
        self.reconnections += 1;
        self.total_reconnect_time += took;
    }

    pub fn connections(&self) -> u64 {
        self.connections
    }

    pub fn disconnections(&self) -> u64 {
        self.disconnections
    }

    pub fn reconnections(&self) -> u64 {
        self.reconnections
    }

    pub fn average_reconnect_time(&self) -> Duration {
        if self.reconnections == 0 {
            return Duration::ZERO;
        }
        // Durations divide by u32; saturate absurd counts
        let n = u32::try_from(self.reconnections).unwrap_or(u32::MAX);
        self.total_reconnect_time / n
    }

    /// `(connections - disconnections) / connections` as a percentage
    pub fn connection_success_rate(&self) -> f64 {
        if self.connections == 0 {
            return 0.0;
        }
        let ok = self.connections.saturating_sub(self.disconnections);
        ok as f64 / self.connections as f64 * 100.0
    }

    pub fn snapshot(
        &self,
        now: Instant,
        last_heartbeat_age: Option<Duration>,
        is_streaming: bool,
        reconnect_attempts: u32,
    ) -> TelemetrySnapshot {
        TelemetrySnapshot {
            connections: self.connections,
            disconnections: self.disconnections,
            reconnections: self.reconnections,
            total_reconnect_time_ms: self.total_reconnect_time.as_millis() as u64,
            average_reconnect_time_ms: self.average_reconnect_time().as_millis() as u64,
            last_disconnect_reason: self.last_disconnect_reason,
            uptime_ms: now.saturating_duration_since(self.uptime_start).as_millis() as u64,
            connection_success_rate: self.connection_success_rate(),
            last_heartbeat_age_ms: last_heartbeat_age.map(|d| d.as_millis() as u64),
            is_streaming,
            reconnect_attempts,
        }
    }
}

/// Render a snapshot in the Prometheus text exposition format.
#[must_use]
pub fn render_prometheus(prefix: &str, snapshot: &TelemetrySnapshot) -> String {
    let mut output = String::with_capacity(1024);

    let ms_to_secs = |ms: u64| ms as f64 / 1000.0;

    let metrics: [(&str, &str, &str, String); 7] = [
        (
            "connections_total",
            "counter",
            "Total stream requests issued, reconnections included",
            snapshot.connections.to_string(),
        ),
        (
            "disconnections_total",
            "counter",
            "Total stream attempts declared dead",
            snapshot.disconnections.to_string(),
        ),
        (
            "reconnections_total",
            "counter",
            "Total successful reconnections",
            snapshot.reconnections.to_string(),
        ),
        (
            "reconnect_duration_seconds",
            "gauge",
            "Average time from disconnection to successful reconnection",
            ms_to_secs(snapshot.average_reconnect_time_ms).to_string(),
        ),
        (
            "uptime_seconds",
            "gauge",
            "Seconds since the client was created",
            ms_to_secs(snapshot.uptime_ms).to_string(),
        ),
        (
            "currently_streaming",
            "gauge",
            "1 while a stream is active",
            u8::from(snapshot.is_streaming).to_string(),
        ),
        (
            "heartbeat_age_seconds",
            "gauge",
            "Seconds since the last chunk was received",
            ms_to_secs(snapshot.last_heartbeat_age_ms.unwrap_or(0)).to_string(),
        ),
    ];

    for (name, kind, help, value) in metrics {
        // Writing to a String cannot fail
        let _ = writeln!(output, "# HELP {prefix}_{name} {help}");
        let _ = writeln!(output, "# TYPE {prefix}_{name} {kind}");
        let _ = writeln!(output, "{prefix}_{name} {value}");
    }

    output
}
