//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// `min(base * 2^attempt, cap)` plus up to 25% random jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub cap: Duration,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    /// Delay before retry number `attempt` (0-indexed), without jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }

    /// Delay with jitter, never below `floor` (e.g. a server's Retry-After)
    /// and never above `cap`.
    pub fn jittered(&self, attempt: u32, floor: Option<Duration>) -> Duration {
        let delay = self.delay(attempt);
        let jitter_ms = (delay.as_millis() as u64) / 4;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        };
        let delay = (delay + jitter).min(self.cap);
        floor.map_or(delay, |floor| delay.max(floor.min(self.cap)))
    }
}
