// Retry delay after the distributed throttle denies an acquire

use super::constants::{DEFAULT_ACQUIRE_RETRY_DELAY, JITTER_MAX, JITTER_MIN, MAX_BACKOFF_EXPONENT};
use rand::Rng;
use std::time::Duration;

/// Backoff policy for denied acquires
///
/// The default is a fixed 250ms delay. With `max > base` the delay doubles on
/// every consecutive denial up to `max`; `jitter` spreads it by ±10% so many
/// processes do not retry in lockstep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcquireBackoff {
    pub base: Duration,
    pub max: Duration,
    pub jitter: bool,
}

impl Default for AcquireBackoff {
    fn default() -> Self {
        Self::fixed(DEFAULT_ACQUIRE_RETRY_DELAY)
    }
}

impl AcquireBackoff {
    pub fn fixed(delay: Duration) -> Self {
        Self {
            base: delay,
            max: delay,
            jitter: false,
        }
    }

    pub fn exponential(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            jitter: true,
        }
    }

    /// Delay after `denials` consecutive denials (1 = first denial)
    pub fn delay(&self, denials: u32) -> Duration {
        let exponent = denials.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
        let raw = self
            .base
            .saturating_mul(1u32 << exponent)
            .min(self.max.max(self.base));

        if !self.jitter {
            return raw;
        }
        let factor = rand::thread_rng().gen_range(JITTER_MIN..=JITTER_MAX);
        raw.mul_f64(factor)
    }
}
