//! HTTP transport
//!
//! `POST`s the request body to an NDJSON endpoint and exposes the response as
//! an incremental byte stream. Reconnection metadata travels both in headers
//! and in the JSON body.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tracing::debug;

use super::traits::{ByteStream, StreamRequest, Transport};
use crate::error::{Result, StreamError};

pub const HEADER_USER_ID: &str = "x-user-id";
pub const HEADER_SESSION_ID: &str = "x-session-id";
pub const HEADER_CONTINUITY_ID: &str = "x-continuity-id";
pub const HEADER_RECONNECTION: &str = "x-reconnection";
pub const HEADER_LAST_CHUNK_TIMESTAMP: &str = "x-last-chunk-timestamp";

/// Longest error body kept in [`StreamError::Status`]
const MAX_ERROR_BODY: usize = 1024;

/// Streams chat responses from an HTTP endpoint.
///
/// Cheaply cloneable (shares the reqwest client internally).
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    /// Build a transport for `endpoint`.
    ///
    /// Only the connect phase is bounded by `connect_timeout`; the body may
    /// stay open indefinitely and is policed by the heartbeat monitor.
    pub fn new(endpoint: impl Into<String>, connect_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self, request: StreamRequest) -> Result<ByteStream> {
        let mut req = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/x-ndjson")
            .json(&request.body());

        if let Some(ref user_id) = request.user_id {
            req = req.header(HEADER_USER_ID, user_id);
        }

        if request.resilient {
            req = req
                .header(HEADER_SESSION_ID, &request.session_id)
                .header(HEADER_CONTINUITY_ID, &request.continuity_id);

            if request.is_reconnection {
                req = req.header(HEADER_RECONNECTION, "true");
                if let Some(ts) = request.last_chunk_timestamp {
                    req = req.header(HEADER_LAST_CHUNK_TIMESTAMP, ts.to_string());
                }
            }
        }

        debug!(
            endpoint = %self.endpoint,
            session_id = %request.session_id,
            is_reconnection = request.is_reconnection,
            "Opening chat stream"
        );

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(StreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response
            .bytes_stream()
            .map(|item| item.map_err(StreamError::from))
            .boxed())
    }
}
