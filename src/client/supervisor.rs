//! Reconnection supervisor
//!
//! Drives connection attempts for one logical stream. Every way an attempt
//! can die (connect failure, bad status, read error, heartbeat timeout) ends
//! up in [`ClientInner::handle_disconnection`].

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::connection::AttemptOutcome;
use super::{ClientInner, StreamOutcome, StreamState};
use crate::error::{Result, StreamError};
use crate::events::StreamEvent;

/// What to do after a disconnection
enum Recovery {
    /// The backoff delay elapsed; try again
    Retry,
    /// Cancelled while waiting, or superseded
    Aborted,
}

impl ClientInner {
    pub(crate) async fn supervise(
        &self,
        token: &CancellationToken,
        generation: u64,
    ) -> Result<StreamOutcome> {
        let mut is_reconnection = false;
        loop {
            match self.run_attempt(token, generation, is_reconnection).await {
                AttemptOutcome::Completed => return Ok(StreamOutcome::Completed),
                AttemptOutcome::Aborted => return Ok(self.abort(generation).await),
                AttemptOutcome::Failed(err) => {
                    match self.handle_disconnection(token, generation, err).await? {
                        Recovery::Retry => is_reconnection = true,
                        Recovery::Aborted => return Ok(self.abort(generation).await),
                    }
                }
            }
        }
    }

    async fn abort(&self, generation: u64) -> StreamOutcome {
        {
            let mut state = self.state.lock().await;
            if state.generation == generation {
                state.heartbeat.stop();
                if state.cancel.as_ref().map_or(true, |t| t.is_cancelled()) {
                    state.cancel = None;
                    state.phase = StreamState::Idle;
                }
            }
        }
        info!(generation, "Chat stream aborted");
        self.events.emit(StreamEvent::Abort);
        StreamOutcome::Aborted
    }

    /// Single entry point for every dead attempt.
    async fn handle_disconnection(
        &self,
        token: &CancellationToken,
        generation: u64,
        err: StreamError,
    ) -> Result<Recovery> {
        let reason = err.disconnect_reason();
        let policy = self.config.reconnect;

        let mut events = Vec::with_capacity(2);
        let next = {
            let mut state = self.state.lock().await;
            if !state.is_current(generation, token) {
                return Ok(Recovery::Aborted);
            }
            state.heartbeat.stop();
            state.telemetry.record_disconnection(reason);

            if !self.config.resilience {
                state.phase = StreamState::Idle;
                state.cancel = None;
                drop(state);
                error!(error = %err, "Chat stream failed");
                self.events.emit(StreamEvent::Error {
                    message: err.to_string(),
                });
                return Err(err);
            }

            state.disconnected_at.get_or_insert_with(Instant::now);
            state.phase = StreamState::Disconnected;
            let spent = state.reconnect.attempts();
            warn!(reason = %reason, attempts = spent, error = %err, "Chat stream disconnected");
            events.push(StreamEvent::Disconnection {
                reason,
                attempts: spent,
            });

            match state.reconnect.try_begin_attempt(&policy) {
                Some(attempt) => {
                    state.phase = StreamState::Reconnecting;
                    let delay = policy.next_delay(attempt);
                    info!(
                        attempt,
                        max_attempts = policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Scheduling reconnection"
                    );
                    events.push(StreamEvent::ReconnectionAttempt {
                        attempt,
                        max_attempts: policy.max_attempts,
                        delay_ms: delay.as_millis() as u64,
                    });
                    Ok(delay)
                }
                None => {
                    state.phase = StreamState::Failed;
                    state.cancel = None;
                    state.disconnected_at = None;
                    error!(attempts = spent, "Reconnection budget exhausted");
                    events.push(StreamEvent::ReconnectionFailed { attempts: spent });
                    Err(spent)
                }
            }
        };
        self.emit_all(events);

        let delay = match next {
            Ok(delay) => delay,
            Err(attempts) => return Err(StreamError::ReconnectionExhausted { attempts }),
        };

        tokio::select! {
            _ = token.cancelled() => Ok(Recovery::Aborted),
            _ = tokio::time::sleep(delay) => Ok(Recovery::Retry),
        }
    }
}
