// Admission queue constants (no magic values)
use std::time::Duration;

/// Delay before retrying a denied distributed acquire (250ms)
pub const DEFAULT_ACQUIRE_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Lower bound of the backoff jitter factor
pub const JITTER_MIN: f64 = 0.9;

/// Upper bound of the backoff jitter factor
pub const JITTER_MAX: f64 = 1.1;

/// Cap on the doubling exponent so the multiplication cannot overflow
pub const MAX_BACKOFF_EXPONENT: u32 = 16;
