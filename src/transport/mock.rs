//! Scripted transport for tests
//!
//! Replays a queue of canned responses, one per `open` call, and records every
//! request it receives. Combined with `#[tokio::test(start_paused = true)]`
//! this drives heartbeat and backoff timing without real sockets.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::Mutex;

use super::traits::{ByteStream, StreamRequest, Transport};
use crate::error::{Result, StreamError};

/// One step of a scripted response body
#[derive(Debug, Clone)]
pub enum Step {
    /// Yield these bytes as one read
    Bytes(Bytes),
    /// Fail the read
    Error(String),
    /// Pause before the next step
    Delay(Duration),
    /// Never yield again (a silent connection)
    Hang,
}

impl Step {
    /// One NDJSON line, newline appended
    pub fn line(line: impl AsRef<str>) -> Self {
        Step::Bytes(Bytes::from(format!("{}\n", line.as_ref())))
    }

    pub fn raw(bytes: impl Into<Bytes>) -> Self {
        Step::Bytes(bytes.into())
    }
}

/// Outcome of one `open` call
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    /// Connect failure
    Fail(String),
    /// Non-success status
    Status { status: u16, body: String },
    /// Headers never arrive
    Pending,
    /// Accepted; the body plays these steps then ends
    Stream(Vec<Step>),
}

impl ScriptedResponse {
    pub fn fail(message: impl Into<String>) -> Self {
        ScriptedResponse::Fail(message.into())
    }

    pub fn status(status: u16) -> Self {
        ScriptedResponse::Status {
            status,
            body: String::new(),
        }
    }

    /// A body made of complete lines that then closes cleanly
    pub fn lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        ScriptedResponse::Stream(lines.into_iter().map(Step::line).collect())
    }

    pub fn steps(steps: Vec<Step>) -> Self {
        ScriptedResponse::Stream(steps)
    }
}

fn play(steps: Vec<Step>) -> ByteStream {
    futures::stream::iter(steps)
        .then(|step| async move {
            match step {
                Step::Bytes(bytes) => Some(Ok(bytes)),
                Step::Error(message) => Some(Err(StreamError::Transport(message))),
                Step::Delay(d) => {
                    tokio::time::sleep(d).await;
                    None
                }
                Step::Hang => {
                    std::future::pending::<()>().await;
                    None
                }
            }
        })
        .filter_map(|item| async move { item })
        .boxed()
}

/// Transport that answers from a script instead of the network.
///
/// # Example
///
/// ```rust
/// use chat_stream_client::transport::mock::{ScriptedResponse, ScriptedTransport};
///
/// let transport = ScriptedTransport::new()
///     .with_response(ScriptedResponse::fail("connection refused"))
///     .with_response(ScriptedResponse::lines([r#"{"event":"done"}"#]));
///
/// # tokio_test::block_on(async {
/// assert_eq!(transport.remaining().await, 2);
/// # });
/// ```
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<ScriptedResponse>>,
    requests: Mutex<Vec<StreamRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response at build time
    pub fn with_response(mut self, response: ScriptedResponse) -> Self {
        self.responses.get_mut().push_back(response);
        self
    }

    /// Queue a response on a shared transport
    pub async fn push(&self, response: ScriptedResponse) {
        self.responses.lock().await.push_back(response);
    }

    /// Every request received so far, in order
    pub async fn requests(&self) -> Vec<StreamRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn remaining(&self) -> usize {
        self.responses.lock().await.len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self, request: StreamRequest) -> Result<ByteStream> {
        self.requests.lock().await.push(request);
        let next = self.responses.lock().await.pop_front();

        match next {
            None => Err(StreamError::Transport("no scripted response left".into())),
            Some(ScriptedResponse::Fail(message)) => Err(StreamError::Transport(message)),
            Some(ScriptedResponse::Status { status, body }) => {
                Err(StreamError::Status { status, body })
            }
            Some(ScriptedResponse::Pending) => std::future::pending().await,
            Some(ScriptedResponse::Stream(steps)) => Ok(play(steps)),
        }
    }
}
