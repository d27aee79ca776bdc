//! Per-client-IP rate limiting with the token bucket algorithm.
//!
//! Each source IP owns a bucket of `burst` tokens refilled at `rps` tokens
//! per second; one request consumes one token. Cleanup is deliberately
//! coarse: every cleanup interval the whole table is wiped and buckets are
//! recreated on the next request. That bounds memory at the cost of a brief
//! burst allowance after each wipe.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::debug;

/// Default interval between wholesale bucket-table wipes.
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitResult {
    Allowed,
    Limited {
        /// Seconds until a token will be available, for `Retry-After`.
        retry_after_secs: u64,
    },
}

impl RateLimitResult {
    #[inline]
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn full(burst: u32) -> Self {
        Self {
            tokens: f64::from(burst),
            last_refill: Instant::now(),
        }
    }

    fn try_consume(&mut self, rate: f64, burst: u32) -> RateLimitResult {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(f64::from(burst));
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            RateLimitResult::Allowed
        } else {
            let seconds_until_token = (1.0 - self.tokens) / rate;
            RateLimitResult::Limited {
                retry_after_secs: (seconds_until_token.ceil() as u64).max(1),
            }
        }
    }
}

/// Thread-safe per-IP limiter. Cloning shares the bucket table.
#[derive(Clone)]
pub struct RateLimiter {
    buckets: Arc<Mutex<HashMap<String, TokenBucket>>>,
    rate: f64,
    burst: u32,
}

impl RateLimiter {
    #[must_use]
    pub fn new(rate: f64, burst: u32) -> Self {
        Self {
            buckets: Arc::new(Mutex::new(HashMap::new())),
            rate,
            burst,
        }
    }

    /// Consume one token for `ip`, creating its bucket on first sight.
    pub fn check(&self, ip: &str) -> RateLimitResult {
        let mut buckets = self.buckets.lock().expect("rate limit table poisoned");
        let bucket = buckets
            .entry(ip.to_string())
            .or_insert_with(|| TokenBucket::full(self.burst));
        bucket.try_consume(self.rate, self.burst)
    }

    /// Wipe the bucket table. Inactive buckets are garbage; active clients
    /// get a fresh burst allowance, which is an accepted amount of jitter.
    pub fn clear(&self) {
        let mut buckets = self.buckets.lock().expect("rate limit table poisoned");
        let dropped = buckets.len();
        buckets.clear();
        if dropped > 0 {
            debug!(dropped, "cleared rate limit buckets");
        }
    }

    /// Number of currently tracked sources.
    #[must_use]
    pub fn source_count(&self) -> usize {
        self.buckets.lock().expect("rate limit table poisoned").len()
    }

    /// Periodically wipe the table. The handle is aborted on shutdown.
    pub fn spawn_cleanup_task(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // immediate first tick
            loop {
                ticker.tick().await;
                limiter.clear();
            }
        })
    }
}
