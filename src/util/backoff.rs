//! Exponential delay schedule for redialing the bus.

use std::time::Duration;

/// Doubling backoff between `min` and `max`, no jitter.
///
/// The first delay is `min`, so the initial dial also waits. The attempt
/// counter is never reset implicitly; a subscription that reconnects
/// successfully and later drops again continues where it left off. Call
/// [`Backoff::reset`] to start over.
#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    const FACTOR: u32 = 2;

    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max,
            attempt: 0,
        }
    }

    /// Returns the next delay and advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let exp = self.attempt.min(32);
        let delay = self.min.saturating_mul(Self::FACTOR.saturating_pow(exp));
        self.attempt = self.attempt.saturating_add(1);
        delay.min(self.max)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
