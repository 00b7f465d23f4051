//! Reconnect backoff and bounded polling.

use std::future::Future;
use std::time::Duration;

/// Exponential backoff with additive jitter.
///
/// Each delay is `current + uniform(0, current)`; `current` then doubles up
/// to `max`. [`Backoff::reset`] returns to `base` after a successful connect.
#[derive(Clone, Debug)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    /// New backoff starting at `base`, never growing past `max`.
    pub fn new(base: Duration, max: Duration) -> Self {
        let max = max.max(base);
        Self {
            base,
            max,
            current: base,
        }
    }

    /// Next delay with random jitter.
    pub fn next_delay(&mut self) -> Duration {
        let jitter: f64 = rand::random();
        self.next_delay_with(jitter)
    }

    /// Next delay with a caller-chosen jitter fraction in `[0, 1]`.
    pub fn next_delay_with(&mut self, jitter: f64) -> Duration {
        let delay = self.current + self.current.mul_f64(jitter.clamp(0.0, 1.0));
        self.current = (self.current * 2).min(self.max);
        delay
    }

    /// Back to the initial delay.
    pub fn reset(&mut self) {
        self.current = self.base;
    }

    /// Delay base before jitter for the next attempt.
    pub fn current(&self) -> Duration {
        self.current
    }
}

/// Bounded retry schedule with linearly increasing delay.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollPolicy {
    /// Poll attempts before giving up.
    pub max_attempts: u32,
    /// Delay after attempt `n` is `base_delay × n`.
    pub base_delay: Duration,
}

impl PollPolicy {
    /// Delay to wait after the given 1-based attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// Run `poll` until it yields a value or the attempts run out.
///
/// `poll` receives the 1-based attempt number. No delay follows the final
/// attempt.
pub async fn poll_with_backoff<T, F, Fut>(policy: PollPolicy, mut poll: F) -> Option<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Option<T>>,
{
    for attempt in 1..=policy.max_attempts {
        if let Some(value) = poll(attempt).await {
            return Some(value);
        }
        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.delay_after(attempt)).await;
        }
    }
    None
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
