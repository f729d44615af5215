//! One connection attempt: open the request, read the body, feed the dispatcher

use futures::StreamExt;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ClientInner, StreamState};
use crate::error::StreamError;
use crate::events::StreamEvent;
use crate::stream::{Frame, LineBuffer};
use crate::transport::StreamRequest;

/// How a single attempt ended
#[derive(Debug)]
pub(crate) enum AttemptOutcome {
    /// Body closed gracefully; `complete` was emitted
    Completed,
    /// Cancelled or superseded
    Aborted,
    /// Transport error or heartbeat timeout
    Failed(StreamError),
}

impl ClientInner {
    pub(crate) async fn run_attempt(
        &self,
        token: &CancellationToken,
        generation: u64,
        is_reconnection: bool,
    ) -> AttemptOutcome {
        let resilient = self.config.resilience;

        let request = {
            let mut state = self.state.lock().await;
            if !state.is_current(generation, token) {
                return AttemptOutcome::Aborted;
            }
            let Some(session) = state.session.as_ref() else {
                return AttemptOutcome::Aborted;
            };
            let request = StreamRequest {
                session_id: session.session_id.clone(),
                messages: session.messages.clone(),
                continuity_id: session.continuity_id.clone(),
                is_reconnection,
                last_chunk_timestamp: session.last_chunk_timestamp,
                resilient,
                user_id: self.config.user_id.clone(),
            };
            state.telemetry.record_connection();
            if resilient {
                state.heartbeat.start(Instant::now());
            }
            request
        };

        let interval = self.config.heartbeat.interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut open = self.transport.open(request);
        let mut body = loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => return AttemptOutcome::Aborted,
                _ = ticker.tick(), if resilient => {
                    if let Some(err) = self.check_heartbeat(generation).await {
                        return AttemptOutcome::Failed(err);
                    }
                }
                result = &mut open => match result {
                    Ok(body) => break body,
                    Err(e) => return AttemptOutcome::Failed(e),
                },
            }
        };

        if !self.accept(token, generation, is_reconnection).await {
            return AttemptOutcome::Aborted;
        }

        let mut lines = LineBuffer::new(self.config.max_line_bytes);
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => return AttemptOutcome::Aborted,
                _ = ticker.tick(), if resilient => {
                    if let Some(err) = self.check_heartbeat(generation).await {
                        return AttemptOutcome::Failed(err);
                    }
                }
                item = body.next() => match item {
                    Some(Ok(bytes)) => {
                        let frames = lines.push(&bytes);
                        if !frames.is_empty()
                            && !self.dispatch_frames(token, generation, frames).await
                        {
                            return AttemptOutcome::Aborted;
                        }
                    }
                    Some(Err(e)) => return AttemptOutcome::Failed(e),
                    None => {
                        let tail: Vec<Frame> = lines.finish().into_iter().collect();
                        return self.complete(token, generation, tail).await;
                    }
                },
            }
        }
    }

    /// Heartbeat timeout error if the current attempt went silent
    async fn check_heartbeat(&self, generation: u64) -> Option<StreamError> {
        let state = self.state.lock().await;
        if state.generation != generation {
            return None;
        }
        let now = Instant::now();
        if state.heartbeat.is_expired(now) {
            let timeout = state.heartbeat.config().timeout;
            warn!(
                age_ms = state.heartbeat.age(now).map(|d| d.as_millis() as u64),
                timeout_ms = timeout.as_millis() as u64,
                "Heartbeat timeout"
            );
            return Some(StreamError::HeartbeatTimeout(timeout));
        }
        None
    }

    /// The backend accepted the request. Returns false when superseded.
    async fn accept(
        &self,
        token: &CancellationToken,
        generation: u64,
        is_reconnection: bool,
    ) -> bool {
        let mut events = Vec::with_capacity(2);
        {
            let mut state = self.state.lock().await;
            if !state.is_current(generation, token) {
                return false;
            }
            let now = Instant::now();
            state.phase = StreamState::Streaming;
            if self.config.resilience {
                state.heartbeat.touch(now);
            }

            if is_reconnection {
                let took = state
                    .disconnected_at
                    .take()
                    .map(|at| now.saturating_duration_since(at))
                    .unwrap_or_default();
                let attempts = state.reconnect.attempts();
                state.telemetry.record_reconnection(took);
                state.reconnect.reset();
                info!(
                    attempts,
                    duration_ms = took.as_millis() as u64,
                    "Reconnected to chat stream"
                );
                events.push(StreamEvent::ReconnectionSuccess {
                    attempts,
                    duration_ms: took.as_millis() as u64,
                });
            }

            let Some(session) = state.session.as_ref() else {
                return false;
            };
            debug!(session_id = %session.session_id, is_reconnection, "Chat stream accepted");
            events.push(StreamEvent::Start {
                session_id: session.session_id.clone(),
                continuity_id: session.continuity_id.clone(),
                is_reconnection,
            });
        }
        self.emit_all(events);
        true
    }

    /// Route frames through the dispatcher. Returns false when superseded.
    async fn dispatch_frames(
        &self,
        token: &CancellationToken,
        generation: u64,
        frames: Vec<Frame>,
    ) -> bool {
        let mut events = Vec::new();
        {
            let mut state = self.state.lock().await;
            if !state.is_current(generation, token) {
                return false;
            }
            let continuity_id = match state.session.as_ref() {
                Some(session) => session.continuity_id.clone(),
                None => return false,
            };
            for frame in frames {
                let dispatch = state.dispatcher.dispatch_frame(frame, &continuity_id);
                if dispatch.live {
                    state.heartbeat.touch(Instant::now());
                    if let Some(session) = state.session.as_mut() {
                        session.mark_chunk_received();
                    }
                }
                events.extend(dispatch.events);
            }
        }
        self.emit_all(events);
        true
    }

    /// Graceful end of body: flush the tail, settle state, emit `complete`.
    async fn complete(
        &self,
        token: &CancellationToken,
        generation: u64,
        tail: Vec<Frame>,
    ) -> AttemptOutcome {
        if !tail.is_empty() && !self.dispatch_frames(token, generation, tail).await {
            return AttemptOutcome::Aborted;
        }

        let content = {
            let mut state = self.state.lock().await;
            if !state.is_current(generation, token) {
                return AttemptOutcome::Aborted;
            }
            state.phase = StreamState::Idle;
            state.heartbeat.stop();
            state.cancel = None;
            state.reconnect.reset();
            state.disconnected_at = None;
            state.dispatcher.buffer().to_owned()
        };

        info!(chars = content.chars().count(), "Chat stream complete");
        self.events.emit(StreamEvent::Complete { content });
        AttemptOutcome::Completed
    }
}
