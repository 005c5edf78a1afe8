//! Retry delay policy applied by the caller before calling `fail`.

use std::time::Duration;

/// Exponential backoff: `base * multiplier^(attempt - 1)`, capped at `max`.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    pub base: Duration,
    pub multiplier: f64,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(2),
            multiplier: 2.0,
            max: Duration::from_secs(300),
        }
    }
}

impl Backoff {
    /// A constant delay.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            base: delay,
            multiplier: 1.0,
            max: delay,
        }
    }

    /// Delay after the given attempt failed. `attempt` is the item's
    /// `retry_count` after its claim (1 for the first attempt).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max.as_secs_f64() {
            return self.max;
        }
        Duration::from_secs_f64(secs)
    }
}
