//! Transport trait definition
//!
//! The client never talks to the network directly; it opens streams through
//! an `Arc<dyn Transport>` so the HTTP implementation can be swapped for the
//! scripted mock in tests.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::Serialize;

use crate::error::{Result, StreamError};
use crate::stream::ChatMessage;

/// Incremental response body
pub type ByteStream = BoxStream<'static, std::result::Result<Bytes, StreamError>>;

/// One streaming request, built from the session context
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRequest {
    pub session_id: String,
    pub messages: Vec<ChatMessage>,
    pub continuity_id: String,
    pub is_reconnection: bool,
    /// Epoch ms of the last admitted chunk
    pub last_chunk_timestamp: Option<i64>,
    /// Send the resumption headers
    pub resilient: bool,
    pub user_id: Option<String>,
}

/// JSON body of the outbound request
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestBody<'a> {
    pub session_id: &'a str,
    pub messages: &'a [ChatMessage],
    pub continuity_id: &'a str,
    pub is_reconnection: bool,
    pub last_chunk_timestamp: Option<i64>,
}

impl StreamRequest {
    pub fn body(&self) -> RequestBody<'_> {
        RequestBody {
            session_id: &self.session_id,
            messages: &self.messages,
            continuity_id: &self.continuity_id,
            is_reconnection: self.is_reconnection,
            last_chunk_timestamp: self.last_chunk_timestamp,
        }
    }
}

/// Opens a streaming chat response.
///
/// Implementations must be `Send + Sync` to be shared as `Arc<dyn Transport>`.
///
/// # Implementations
///
/// - [`HttpTransport`](super::HttpTransport): `POST` to an NDJSON endpoint
/// - [`ScriptedTransport`](super::mock::ScriptedTransport): replays canned
///   responses (for tests)
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue the request and return the body once the backend accepts it.
    ///
    /// # Errors
    ///
    /// Connect failures and non-success statuses. Read failures surface as
    /// `Err` items of the returned stream.
    async fn open(&self, request: StreamRequest) -> Result<ByteStream>;
}
