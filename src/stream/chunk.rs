//! Wire format of the NDJSON chat stream
//!
//! Each line is one JSON object with a `type` field, or the bare
//! `{"event":"done"}` end marker.

use serde::{Deserialize, Serialize};

/// Role of a message in the conversation history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of the conversation history sent with every request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Lifecycle of a backend tool call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Start,
    Result,
}

/// A parsed line of the stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Chunk {
    Delta {
        content: String,
        #[serde(
            rename = "sequenceNumber",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        sequence_number: Option<u64>,
    },
    Tool {
        status: ToolStatus,
        name: String,
        #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
        args: serde_json::Value,
        #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
        data: serde_json::Value,
    },
    Final {
        content: String,
        #[serde(
            rename = "sequenceNumber",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        sequence_number: Option<u64>,
    },
    Heartbeat,
    ContinuityCheck {
        #[serde(rename = "streamId", default, skip_serializing_if = "Option::is_none")]
        stream_id: Option<String>,
        #[serde(rename = "sequenceNumber")]
        sequence_number: u64,
    },
    Done,
}

impl Chunk {
    /// Sequence number subject to duplicate rejection.
    ///
    /// Continuity checks are evaluated separately and never advance the counter.
    pub fn sequence_number(&self) -> Option<u64> {
        match self {
            Chunk::Delta {
                sequence_number, ..
            }
            | Chunk::Final {
                sequence_number, ..
            } => *sequence_number,
            _ => None,
        }
    }
}

/// Why a line could not be turned into a [`Chunk`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkParseError {
    #[error("invalid JSON: {0}")]
    Json(String),
    #[error("line is not a JSON object")]
    NotAnObject,
    #[error("missing `type` field")]
    MissingType,
    #[error("invalid `{kind}` chunk: {message}")]
    InvalidChunk { kind: String, message: String },
    #[error("line exceeds {limit} bytes ({len} buffered)")]
    Oversized { len: usize, limit: usize },
}

/// Parse one line of the wire protocol.
pub fn parse_line(line: &[u8]) -> Result<Chunk, ChunkParseError> {
    let value: serde_json::Value =
        serde_json::from_slice(line).map_err(|e| ChunkParseError::Json(e.to_string()))?;

    let obj = value.as_object().ok_or(ChunkParseError::NotAnObject)?;

    if !obj.contains_key("type") {
        return match obj.get("event").and_then(|v| v.as_str()) {
            Some("done") => Ok(Chunk::Done),
            _ => Err(ChunkParseError::MissingType),
        };
    }

    let kind = obj
        .get("type")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    serde_json::from_value(value).map_err(|e| ChunkParseError::InvalidChunk {
        kind,
        message: e.to_string(),
    })
}
