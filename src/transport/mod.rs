//! Stream transports
//!
//! This module provides:
//! - `Transport`: async trait that opens a streaming response
//! - `HttpTransport`: reqwest-based NDJSON client
//! - `mock::ScriptedTransport`: canned responses for tests

mod http;
pub mod mock;
mod traits;

pub use http::{
    HttpTransport, HEADER_CONTINUITY_ID, HEADER_LAST_CHUNK_TIMESTAMP, HEADER_RECONNECTION,
    HEADER_SESSION_ID, HEADER_USER_ID,
};
pub use traits::{ByteStream, RequestBody, StreamRequest, Transport};
