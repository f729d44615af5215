//! Exponential backoff with jitter for reconnection attempts

use std::time::Duration;

pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;
pub const DEFAULT_BASE_RECONNECT_DELAY: Duration = Duration::from_millis(1000);
pub const DEFAULT_MAX_RECONNECT_DELAY: Duration = Duration::from_millis(30_000);
pub const DEFAULT_BACKOFF_FACTOR: f64 = 1.5;

/// Upper bound of the random jitter, as a fraction of the capped delay
const JITTER_RATIO: f64 = 0.1;

/// Reconnection budget and backoff parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            base_delay: DEFAULT_BASE_RECONNECT_DELAY,
            max_delay: DEFAULT_MAX_RECONNECT_DELAY,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
        }
    }
}

impl ReconnectPolicy {
    /// `min(base * factor^attempt, max)` without jitter
    pub fn capped_delay(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base_ms = self.base_delay.as_secs_f64() * 1000.0;
        let raw_ms = base_ms * self.backoff_factor.powi(exp);
        let max_ms = self.max_delay.as_secs_f64() * 1000.0;
        // NaN/inf from huge exponents collapse to the cap
        let ms = if raw_ms.is_finite() {
            raw_ms.min(max_ms)
        } else {
            max_ms
        };
        Duration::from_secs_f64(ms.max(0.0) / 1000.0)
    }

    /// Capped delay plus jitter; `jitter_unit` in `[0, 1]` scales `[0, 10%]`.
    pub fn delay_with_jitter(&self, attempt: u32, jitter_unit: f64) -> Duration {
        let capped = self.capped_delay(attempt);
        let unit = if jitter_unit.is_finite() {
            jitter_unit.clamp(0.0, 1.0)
        } else {
            0.0
        };
        capped + capped.mul_f64(JITTER_RATIO * unit)
    }

    /// Delay for `attempt` with a freshly drawn jitter
    pub fn next_delay(&self, attempt: u32) -> Duration {
        self.delay_with_jitter(attempt, rand::random::<f64>())
    }
}

/// Attempts spent in the current disconnection streak
#[derive(Debug, Clone, Default)]
pub struct ReconnectionState {
    attempts: u32,
}

impl ReconnectionState {
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Consume one attempt if the budget allows; returns the new attempt number.
    pub fn try_begin_attempt(&mut self, policy: &ReconnectPolicy) -> Option<u32> {
        if self.attempts >= policy.max_attempts {
            return None;
        }
        self.attempts += 1;
        Some(self.attempts)
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
