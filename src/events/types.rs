//! Stream event types published on the event bus

use serde::{Deserialize, Serialize};

use crate::error::DisconnectReason;

/// Events emitted by the streaming client (sent via broadcast and handlers)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A request was accepted by the backend and the body is being read
    Start {
        session_id: String,
        continuity_id: String,
        is_reconnection: bool,
    },
    /// Streaming text delta
    Delta {
        content: String,
        /// Running text buffer including this delta
        buffer: String,
    },
    /// The backend started a tool call
    #[serde(rename = "tool-start")]
    ToolStart {
        name: String,
        #[serde(default)]
        args: serde_json::Value,
    },
    /// The backend finished a tool call
    #[serde(rename = "tool-result")]
    ToolResult {
        name: String,
        #[serde(default)]
        data: serde_json::Value,
    },
    /// Authoritative full text, replaces the running buffer
    Final { content: String },
    /// The backend marked the end of its answer
    Done,
    /// The response body closed gracefully
    Complete { content: String },
    /// The stream was cancelled (explicit stop or superseded by a new stream)
    Abort,
    /// Non-recoverable error when resilient mode is off
    Error { message: String },
    /// The connection was declared dead
    Disconnection {
        reason: DisconnectReason,
        /// Reconnection attempts already spent in this streak
        attempts: u32,
    },
    /// A reconnection is scheduled after `delay_ms`
    ReconnectionAttempt {
        attempt: u32,
        max_attempts: u32,
        delay_ms: u64,
    },
    /// A reconnection request was accepted
    ReconnectionSuccess { attempts: u32, duration_ms: u64 },
    /// The reconnection budget is exhausted
    ReconnectionFailed { attempts: u32 },
    /// Explicit heartbeat chunk received
    Heartbeat,
    /// Result of a server-side continuity check
    ContinuityVerified {
        stream_id: Option<String>,
        sequence_number: u64,
        /// Next sequence number the client expects
        expected: u64,
        in_sync: bool,
    },
    /// A line could not be parsed and was skipped
    ChunkError { line: String, message: String },
    /// `stop()` cancelled an active stream
    Stop,
}

/// Discriminant of [`StreamEvent`], used as the key of handler registrations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Start,
    Delta,
    ToolStart,
    ToolResult,
    Final,
    Done,
    Complete,
    Abort,
    Error,
    Disconnection,
    ReconnectionAttempt,
    ReconnectionSuccess,
    ReconnectionFailed,
    Heartbeat,
    ContinuityVerified,
    ChunkError,
    Stop,
}

impl StreamEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            StreamEvent::Start { .. } => EventKind::Start,
            StreamEvent::Delta { .. } => EventKind::Delta,
            StreamEvent::ToolStart { .. } => EventKind::ToolStart,
            StreamEvent::ToolResult { .. } => EventKind::ToolResult,
            StreamEvent::Final { .. } => EventKind::Final,
            StreamEvent::Done => EventKind::Done,
            StreamEvent::Complete { .. } => EventKind::Complete,
            StreamEvent::Abort => EventKind::Abort,
            StreamEvent::Error { .. } => EventKind::Error,
            StreamEvent::Disconnection { .. } => EventKind::Disconnection,
            StreamEvent::ReconnectionAttempt { .. } => EventKind::ReconnectionAttempt,
            StreamEvent::ReconnectionSuccess { .. } => EventKind::ReconnectionSuccess,
            StreamEvent::ReconnectionFailed { .. } => EventKind::ReconnectionFailed,
            StreamEvent::Heartbeat => EventKind::Heartbeat,
            StreamEvent::ContinuityVerified { .. } => EventKind::ContinuityVerified,
            StreamEvent::ChunkError { .. } => EventKind::ChunkError,
            StreamEvent::Stop => EventKind::Stop,
        }
    }

    /// Get the event type name (as seen by UI subscribers)
    pub fn event_type(&self) -> &'static str {
        self.kind().as_str()
    }
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Start => "start",
            EventKind::Delta => "delta",
            EventKind::ToolStart => "tool-start",
            EventKind::ToolResult => "tool-result",
            EventKind::Final => "final",
            EventKind::Done => "done",
            EventKind::Complete => "complete",
            EventKind::Abort => "abort",
            EventKind::Error => "error",
            EventKind::Disconnection => "disconnection",
            EventKind::ReconnectionAttempt => "reconnection_attempt",
            EventKind::ReconnectionSuccess => "reconnection_success",
            EventKind::ReconnectionFailed => "reconnection_failed",
            EventKind::Heartbeat => "heartbeat",
            EventKind::ContinuityVerified => "continuity_verified",
            EventKind::ChunkError => "chunk_error",
            EventKind::Stop => "stop",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
