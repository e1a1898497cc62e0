//! Retry policy: backoff delays while the task store is unreachable.

use std::time::Duration;

/// Exponential backoff with an upper bound.
///
/// delay = base_delay * multiplier^(attempts - 1), capped at `max_delay`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay after the first failure.
    pub base_delay: Duration,

    pub multiplier: f64,

    /// No delay ever exceeds this.
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, multiplier: f64, max_delay: Duration) -> Self {
        Self {
            base_delay,
            multiplier,
            max_delay,
        }
    }

    /// Same delay every time.
    pub fn constant(delay: Duration) -> Self {
        Self::new(delay, 1.0, delay)
    }

    /// Delay before the next try, given how many consecutive failures were
    /// seen so far (1-indexed; 0 is treated as 1).
    ///
    /// Example with base_delay=1s, multiplier=2.0, max_delay=60s:
    /// 1s, 2s, 4s, 8s, 16s, 32s, 60s, 60s, ...
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), 2.0, Duration::from_secs(60))
    }
}
