//! Exponential backoff policy for reconnect attempts.

use std::time::Duration;

/// Pure attempt-count → delay mapping for reconnect scheduling.
///
/// Attempt `n` (1-based) waits `base * multiplier^(n-1)`; once `n`
/// exceeds `max_attempts` the policy yields `None` and the connection
/// supervisor gives up (terminal disconnect, manual reconnect required).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub base: Duration,
    /// Growth factor between consecutive attempts.
    pub multiplier: u32,
    /// Number of attempts before giving up.
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    /// The production policy: 1000 ms base, doubling, capped at 5
    /// attempts (1s, 2s, 4s, 8s, 16s).
    fn default() -> Self {
        Self {
            base: Duration::from_millis(1000),
            multiplier: 2,
            max_attempts: 5,
        }
    }
}

impl BackoffPolicy {
    /// Returns the delay before reconnect attempt `attempt` (1-based),
    /// or `None` once the attempt cap is exhausted.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        Some(self.base * self.multiplier.pow(attempt - 1))
    }
}
