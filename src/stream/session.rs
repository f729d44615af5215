//! Resumable state of one logical chat stream

use chrono::Utc;
use uuid::Uuid;

use super::chunk::ChatMessage;

/// Everything needed to resume a broken stream
#[derive(Debug, Clone, PartialEq)]
pub struct SessionContext {
    /// Stable for the whole conversation
    pub session_id: String,
    /// Full history sent with every request
    pub messages: Vec<ChatMessage>,
    /// Wall-clock time (epoch ms) of the last admitted chunk
    pub last_chunk_timestamp: Option<i64>,
    /// Identifies one logical stream and all its reconnections
    pub continuity_id: String,
}

impl SessionContext {
    /// Start a new turn with a fresh continuity id.
    pub fn new(session_id: Option<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            session_id: session_id.unwrap_or_else(|| format!("session-{}", Uuid::new_v4())),
            messages,
            last_chunk_timestamp: None,
            continuity_id: Uuid::new_v4().to_string(),
        }
    }

    /// Record that a chunk was admitted now
    pub fn mark_chunk_received(&mut self) {
        self.last_chunk_timestamp = Some(Utc::now().timestamp_millis());
    }
}
