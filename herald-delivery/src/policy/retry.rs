//! Retry policy for delivery attempts.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Retry configuration: how many attempts a single provider gets and how
/// long to wait between them.
///
/// The backoff for attempt *n* (1-indexed) is `base * 2^n`, capped at
/// `max_delay_secs`, with ±`jitter_factor` randomization so concurrent
/// failures don't retry in lockstep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of delivery attempts per provider before giving up.
    ///
    /// Default: 3 attempts
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Base delay for exponential backoff (in seconds).
    ///
    /// Default: 1 second, giving waits of 2s, 4s, 8s, ...
    #[serde(default = "defaults::base_delay_secs")]
    pub base_delay_secs: u64,

    /// Cap on any single backoff wait (in seconds).
    ///
    /// Default: 60 seconds
    #[serde(default = "defaults::max_delay_secs")]
    pub max_delay_secs: u64,

    /// Jitter factor for randomizing delays (±fraction).
    ///
    /// Default: 0.1 (±10%)
    #[serde(default = "defaults::jitter_factor")]
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            base_delay_secs: defaults::base_delay_secs(),
            max_delay_secs: defaults::max_delay_secs(),
            jitter_factor: defaults::jitter_factor(),
        }
    }
}

impl RetryPolicy {
    /// Whether another attempt is allowed after `attempt_count` attempts.
    #[must_use]
    pub const fn should_retry(&self, attempt_count: u32) -> bool {
        attempt_count < self.max_attempts
    }

    /// The wait before the attempt following attempt number `attempt`
    /// (1-indexed).
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponential = self
            .base_delay_secs
            .saturating_mul(2u64.saturating_pow(attempt));
        let capped = exponential.min(self.max_delay_secs);

        if self.jitter_factor <= 0.0 || capped == 0 {
            return Duration::from_secs(capped);
        }

        #[allow(
            clippy::cast_precision_loss,
            reason = "delays are far below f64 integer precision"
        )]
        let base = capped as f64;
        let jitter_range = base * self.jitter_factor;
        let jitter: f64 = rand::rng().random_range(-jitter_range..=jitter_range);

        Duration::from_secs_f64((base + jitter).max(0.0))
    }
}

mod defaults {
    pub const fn max_attempts() -> u32 {
        3
    }

    pub const fn base_delay_secs() -> u64 {
        1
    }

    pub const fn max_delay_secs() -> u64 {
        60
    }

    pub const fn jitter_factor() -> f64 {
        0.1
    }
}
