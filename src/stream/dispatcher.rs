//! Chunk dispatcher: turns wire lines into stream events
//!
//! Malformed lines become `chunk_error` events and never abort the stream.
//! Sequenced chunks go through the [`ContinuityVerifier`] first; duplicates
//! are dropped without any event.

use tracing::{debug, warn};

use super::chunk::{parse_line, Chunk, ChunkParseError, ToolStatus};
use super::continuity::ContinuityVerifier;
use super::lines::Frame;
use crate::events::StreamEvent;

/// Maximum number of bytes of a bad line echoed back in `chunk_error`
const ERROR_LINE_PREVIEW: usize = 256;

/// Result of dispatching one frame
#[derive(Debug, Default)]
pub struct Dispatch {
    /// Events to publish, in order
    pub events: Vec<StreamEvent>,
    /// A chunk was admitted (counts as proof of life)
    pub live: bool,
}

#[derive(Debug, Default)]
pub struct ChunkDispatcher {
    buffer: String,
    verifier: ContinuityVerifier,
}

impl ChunkDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Running text of the current turn
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn verifier(&self) -> &ContinuityVerifier {
        &self.verifier
    }

    /// Forget the buffer and sequence state (new continuity id)
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.verifier.reset();
    }

    pub fn dispatch_frame(&mut self, frame: Frame, continuity_id: &str) -> Dispatch {
        match frame {
            Frame::Line(line) => self.dispatch_line(&line, continuity_id),
            Frame::Oversized { len, limit } => {
                warn!(len, limit, "Dropping oversized stream line");
                Dispatch {
                    events: vec![StreamEvent::ChunkError {
                        line: String::new(),
                        message: ChunkParseError::Oversized { len, limit }.to_string(),
                    }],
                    live: false,
                }
            }
        }
    }

    /// Parse and route one line.
    pub fn dispatch_line(&mut self, line: &[u8], continuity_id: &str) -> Dispatch {
        if line.iter().all(|b| b.is_ascii_whitespace()) {
            return Dispatch::default();
        }

        let chunk = match parse_line(line) {
            Ok(chunk) => chunk,
            Err(e) => {
                let preview = String::from_utf8_lossy(&line[..line.len().min(ERROR_LINE_PREVIEW)])
                    .into_owned();
                warn!(error = %e, "Skipping malformed stream line");
                return Dispatch {
                    events: vec![StreamEvent::ChunkError {
                        line: preview,
                        message: e.to_string(),
                    }],
                    live: false,
                };
            }
        };

        if !self.verifier.admit(chunk.sequence_number()) {
            debug!(
                sequence_number = ?chunk.sequence_number(),
                expected = self.verifier.expected(),
                "Dropping duplicate chunk"
            );
            return Dispatch::default();
        }

        let event = match chunk {
            Chunk::Delta { content, .. } => {
                self.buffer.push_str(&content);
                StreamEvent::Delta {
                    content,
                    buffer: self.buffer.clone(),
                }
            }
            Chunk::Tool {
                status: ToolStatus::Start,
                name,
                args,
                ..
            } => StreamEvent::ToolStart { name, args },
            Chunk::Tool {
                status: ToolStatus::Result,
                name,
                data,
                ..
            } => StreamEvent::ToolResult { name, data },
            Chunk::Final { content, .. } => {
                self.buffer = content.clone();
                StreamEvent::Final { content }
            }
            Chunk::Heartbeat => StreamEvent::Heartbeat,
            Chunk::ContinuityCheck {
                stream_id,
                sequence_number,
            } => {
                let checkpoint = self.verifier.checkpoint(sequence_number);
                if let Some(ref id) = stream_id {
                    if id != continuity_id {
                        warn!(
                            stream_id = %id,
                            continuity_id = %continuity_id,
                            "Continuity check for a different stream"
                        );
                    }
                }
                let in_sync = checkpoint.in_sync
                    && stream_id.as_deref().map_or(true, |id| id == continuity_id);
                StreamEvent::ContinuityVerified {
                    stream_id,
                    sequence_number,
                    expected: checkpoint.expected,
                    in_sync,
                }
            }
            Chunk::Done => StreamEvent::Done,
        };

        Dispatch {
            events: vec![event],
            live: true,
        }
    }
}
