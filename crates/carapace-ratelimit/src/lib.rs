// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-session token-bucket rate limiting.
//!
//! Invoked synchronously from stage 4 of the pipeline, after group
//! authorization has already passed — unauthorized requests must never
//! burn a token.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

/// Bucket sizing and refill rate, shared by every session.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Steady-state refill rate.
    pub requests_per_minute: u32,
    /// Maximum tokens a bucket can hold, and its starting balance.
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            burst_size: 10,
        }
    }
}

/// Outcome of a [`RateLimiter::try_consume`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsumeResult {
    /// Whether a token was available and consumed.
    pub allowed: bool,
    /// Wall-clock seconds until a token is available, when `!allowed`.
    pub retry_after: Option<u64>,
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn fresh(burst_size: u32) -> Self {
        Self {
            tokens: f64::from(burst_size),
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, config: &RateLimitConfig) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        let rate_per_sec = f64::from(config.requests_per_minute) / 60.0;
        self.tokens = (self.tokens + elapsed * rate_per_sec).min(f64::from(config.burst_size));
        self.last_refill = now;
    }
}

/// Per-session token buckets, created lazily on first use.
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    /// Build a limiter with the given config; no buckets exist yet.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Attempt to consume one token for `session_id`, creating its
    /// bucket (full) if this is the session's first request.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned by a prior panic while
    /// holding the lock.
    pub fn try_consume(&self, session_id: &str) -> ConsumeResult {
        let mut buckets = self.buckets.lock().expect("rate limiter mutex poisoned");
        let bucket = buckets
            .entry(session_id.to_string())
            .or_insert_with(|| Bucket::fresh(self.config.burst_size));

        bucket.refill(&self.config);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            ConsumeResult {
                allowed: true,
                retry_after: None,
            }
        } else {
            let rate_per_sec = f64::from(self.config.requests_per_minute) / 60.0;
            let retry_after = if rate_per_sec > 0.0 {
                ((1.0 - bucket.tokens) / rate_per_sec).ceil().max(1.0) as u64
            } else {
                u64::MAX
            };
            ConsumeResult {
                allowed: false,
                retry_after: Some(retry_after),
            }
        }
    }

    /// Drop a session's bucket, freeing its memory. Called when a
    /// session ends.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned by a prior panic while
    /// holding the lock.
    pub fn evict(&self, session_id: &str) {
        self.buckets
            .lock()
            .expect("rate limiter mutex poisoned")
            .remove(session_id);
    }
}
