//! Stream protocol building blocks
//!
//! Everything here is synchronous and transport-agnostic; the client drives
//! these pieces from its read loop:
//! - `lines` splits body bytes into NDJSON lines
//! - `chunk` parses the wire format
//! - `continuity` rejects replayed sequence numbers
//! - `dispatcher` routes admitted chunks to events
//! - `heartbeat` tracks liveness
//! - `reconnect` computes backoff delays and tracks the attempt budget
//! - `session` holds the resumable context

pub mod chunk;
pub mod continuity;
pub mod dispatcher;
pub mod heartbeat;
pub mod lines;
pub mod reconnect;
pub mod session;

pub use chunk::{parse_line, ChatMessage, Chunk, ChunkParseError, Role, ToolStatus};
pub use continuity::{Checkpoint, ContinuityVerifier};
pub use dispatcher::{ChunkDispatcher, Dispatch};
pub use heartbeat::{HeartbeatConfig, HeartbeatMonitor};
pub use lines::{Frame, LineBuffer};
pub use reconnect::{ReconnectPolicy, ReconnectionState};
pub use session::SessionContext;
