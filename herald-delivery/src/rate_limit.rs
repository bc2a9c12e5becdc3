//! Per-domain rate limiting.
//!
//! The engine consults a [`RateLimitGate`] keyed by recipient domain before
//! opening any connection; a denial short-circuits the send with zero
//! network IO and surfaces how long to wait. Embedders backed by a shared
//! store implement the trait themselves; [`TokenBucketGate`] is the
//! in-process implementation.
//!
//! # Token bucket
//!
//! - Tokens are added at a constant rate (`messages_per_second`)
//! - Each message consumes one token
//! - The bucket holds at most `burst_size` tokens (allows bursts)

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::DashMap;
use herald_common::{Domain, tracing};
use serde::{Deserialize, Serialize};

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Delivery may proceed; one unit of budget has been reserved.
    Allowed,
    /// Delivery refused; retry no sooner than `retry_after`.
    Denied { retry_after: Duration },
}

/// Pre-flight gate consulted once per send, keyed by recipient domain.
pub trait RateLimitGate: Send + Sync {
    fn check_and_reserve(&self, domain: &Domain) -> RateDecision;
}

/// A gate that never refuses. The default when no rate limiting is
/// configured.
#[derive(Debug, Default)]
pub struct UnlimitedGate;

impl RateLimitGate for UnlimitedGate {
    fn check_and_reserve(&self, _domain: &Domain) -> RateDecision {
        RateDecision::Allowed
    }
}

/// Configuration for the in-process token bucket gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Default messages per second per domain.
    #[serde(default = "default_messages_per_second")]
    pub messages_per_second: f64,

    /// Default burst size (max tokens in bucket).
    #[serde(default = "default_burst_size")]
    pub burst_size: u32,

    /// Per-domain overrides.
    #[serde(default)]
    pub domain_limits: ahash::AHashMap<String, DomainRateLimit>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            messages_per_second: default_messages_per_second(),
            burst_size: default_burst_size(),
            domain_limits: ahash::AHashMap::default(),
        }
    }
}

const fn default_messages_per_second() -> f64 {
    10.0
}

const fn default_burst_size() -> u32 {
    20
}

/// Per-domain rate limit override.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainRateLimit {
    pub messages_per_second: f64,
    pub burst_size: u32,
}

/// Token bucket for a single domain.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(messages_per_second: f64, burst_size: u32) -> Self {
        let capacity = f64::from(burst_size);
        Self {
            tokens: capacity, // Start with full bucket
            capacity,
            refill_rate: messages_per_second,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();

        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    fn try_consume(&mut self) -> bool {
        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn time_until_available(&mut self) -> Duration {
        self.refill();

        if self.tokens >= 1.0 {
            return Duration::ZERO;
        }

        let tokens_needed = 1.0 - self.tokens;
        Duration::from_secs_f64(tokens_needed / self.refill_rate)
    }
}

/// In-process per-domain rate limiter.
#[derive(Debug)]
pub struct TokenBucketGate {
    config: RateLimitConfig,
    buckets: DashMap<Domain, Arc<parking_lot::Mutex<TokenBucket>>>,
}

impl TokenBucketGate {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: DashMap::new(),
        }
    }

    fn get_bucket(&self, domain: &Domain) -> Arc<parking_lot::Mutex<TokenBucket>> {
        self.buckets
            .entry(domain.clone())
            .or_insert_with(|| {
                let (messages_per_second, burst_size) =
                    self.config.domain_limits.get(domain.as_str()).map_or_else(
                        || (self.config.messages_per_second, self.config.burst_size),
                        |limit| (limit.messages_per_second, limit.burst_size),
                    );

                Arc::new(parking_lot::Mutex::new(TokenBucket::new(
                    messages_per_second,
                    burst_size,
                )))
            })
            .clone()
    }
}

impl RateLimitGate for TokenBucketGate {
    fn check_and_reserve(&self, domain: &Domain) -> RateDecision {
        let bucket = self.get_bucket(domain);
        let mut bucket = bucket.lock();

        if bucket.try_consume() {
            RateDecision::Allowed
        } else {
            let retry_after = bucket.time_until_available();
            drop(bucket);
            tracing::debug!(
                domain = %domain,
                wait_seconds = retry_after.as_secs_f64(),
                "Rate limit exceeded"
            );
            RateDecision::Denied { retry_after }
        }
    }
}
