//! Resilient streaming chat client
//!
//! [`StreamClient`] owns one logical stream at a time. All mutable state sits
//! behind a single async mutex that is never held across an `.await`; events
//! are published after the lock is released.

mod connection;
mod supervisor;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::ClientConfig;
use crate::error::Result;
use crate::events::{EventBus, EventKind, StreamEvent, SubscriptionId};
use crate::stream::{
    ChatMessage, ChunkDispatcher, HeartbeatMonitor, ReconnectionState, SessionContext,
};
use crate::telemetry::{render_prometheus, Telemetry, TelemetrySnapshot};
use crate::transport::{HttpTransport, Transport};

/// Lifecycle phase of the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    Idle,
    Streaming,
    Disconnected,
    Reconnecting,
    /// The reconnection budget was exhausted
    Failed,
}

/// How a `stream_chat` call ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The body closed gracefully
    Completed,
    /// Cancelled by `stop()`, `reset()` or a newer stream
    Aborted,
}

pub(crate) struct ClientState {
    pub(crate) phase: StreamState,
    /// Bumped by every fresh `stream_chat`
    pub(crate) generation: u64,
    pub(crate) cancel: Option<CancellationToken>,
    pub(crate) session: Option<SessionContext>,
    pub(crate) dispatcher: ChunkDispatcher,
    pub(crate) heartbeat: HeartbeatMonitor,
    pub(crate) reconnect: ReconnectionState,
    pub(crate) telemetry: Telemetry,
    /// First disconnection of the current streak
    pub(crate) disconnected_at: Option<Instant>,
}

impl ClientState {
    pub(crate) fn is_current(&self, generation: u64, token: &CancellationToken) -> bool {
        self.generation == generation && !token.is_cancelled()
    }
}

pub(crate) struct ClientInner {
    pub(crate) config: ClientConfig,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) events: EventBus,
    pub(crate) state: Mutex<ClientState>,
}

impl ClientInner {
    pub(crate) fn emit_all(&self, events: Vec<StreamEvent>) {
        for event in events {
            self.events.emit(event);
        }
    }
}

/// Streaming chat client with heartbeat monitoring, automatic reconnection
/// and duplicate suppression.
///
/// Cheaply cloneable; clones share the same stream and event bus.
#[derive(Clone)]
pub struct StreamClient {
    inner: Arc<ClientInner>,
}

impl StreamClient {
    /// Create a client over an explicit transport.
    pub fn new(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        let state = ClientState {
            phase: StreamState::Idle,
            generation: 0,
            cancel: None,
            session: None,
            dispatcher: ChunkDispatcher::new(),
            heartbeat: HeartbeatMonitor::new(config.heartbeat),
            reconnect: ReconnectionState::default(),
            telemetry: Telemetry::new(Instant::now()),
            disconnected_at: None,
        };
        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                transport,
                events: EventBus::default(),
                state: Mutex::new(state),
            }),
        })
    }

    /// Create a client that talks HTTP to `config.endpoint`.
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        let transport = HttpTransport::new(config.endpoint.clone(), config.connect_timeout)?;
        Self::new(config, Arc::new(transport))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Stream one assistant turn for `messages`.
    ///
    /// Any stream already in flight is cancelled first. Without a
    /// `session_id` the previous session id is reused, or a new one is
    /// generated. Resolves once the stream completes, is aborted, or fails
    /// for good.
    pub async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        session_id: Option<String>,
    ) -> Result<StreamOutcome> {
        let (token, generation, previous) = {
            let mut state = self.inner.state.lock().await;
            let previous = state.cancel.take();
            state.generation += 1;

            let session_id =
                session_id.or_else(|| state.session.as_ref().map(|s| s.session_id.clone()));
            let session = SessionContext::new(session_id, messages);
            info!(
                session_id = %session.session_id,
                continuity_id = %session.continuity_id,
                generation = state.generation,
                "Starting chat stream"
            );
            state.session = Some(session);
            state.dispatcher.reset();
            state.reconnect.reset();
            state.disconnected_at = None;
            state.phase = StreamState::Streaming;

            let token = CancellationToken::new();
            state.cancel = Some(token.clone());
            (token, state.generation, previous)
        };

        if let Some(previous) = previous {
            previous.cancel();
        }

        self.inner.supervise(&token, generation).await
    }

    /// Cancel the active stream and any pending reconnection.
    ///
    /// Idempotent: only a call that actually cancelled something emits `stop`.
    pub async fn stop(&self) {
        let stopped = {
            let mut state = self.inner.state.lock().await;
            state.heartbeat.stop();
            state.reconnect.reset();
            state.disconnected_at = None;
            // Cancelled under the lock so the read loop cannot dispatch past this point
            match state.cancel.take() {
                Some(token) => {
                    token.cancel();
                    state.phase = StreamState::Idle;
                    true
                }
                None => false,
            }
        };

        if stopped {
            info!("Chat stream stopped");
            self.inner.events.emit(StreamEvent::Stop);
        }
    }

    /// `stop()` plus forgetting the session, buffer and sequence state.
    /// Telemetry is kept.
    pub async fn reset(&self) {
        self.stop().await;
        let mut state = self.inner.state.lock().await;
        state.session = None;
        state.dispatcher.reset();
        state.phase = StreamState::Idle;
    }

    /// Register a handler for one event kind
    pub fn on<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        self.inner.events.on(kind, handler)
    }

    /// Remove a handler registered with [`on`](Self::on)
    pub fn off(&self, id: SubscriptionId) -> bool {
        self.inner.events.off(id)
    }

    /// Receive every event
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.inner.events.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub async fn telemetry(&self) -> TelemetrySnapshot {
        let state = self.inner.state.lock().await;
        let now = Instant::now();
        state.telemetry.snapshot(
            now,
            state.heartbeat.age(now),
            state.cancel.is_some(),
            state.reconnect.attempts(),
        )
    }

    /// Telemetry in the Prometheus text exposition format
    pub async fn prometheus_metrics(&self) -> String {
        let snapshot = self.telemetry().await;
        render_prometheus(&self.inner.config.metrics_prefix, &snapshot)
    }

    /// True while a stream is active, reconnection included
    pub async fn is_streaming(&self) -> bool {
        self.inner.state.lock().await.cancel.is_some()
    }

    /// Running text of the current turn
    pub async fn current_buffer(&self) -> String {
        self.inner.state.lock().await.dispatcher.buffer().to_owned()
    }

    pub async fn state(&self) -> StreamState {
        self.inner.state.lock().await.phase
    }

    pub async fn session(&self) -> Option<SessionContext> {
        self.inner.state.lock().await.session.clone()
    }
}

impl std::fmt::Debug for StreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamClient")
            .field("endpoint", &self.inner.config.endpoint)
            .field("resilience", &self.inner.config.resilience)
            .finish()
    }
}
