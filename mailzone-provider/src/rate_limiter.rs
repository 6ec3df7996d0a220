//! Token bucket limiter shared by every request of an API client
//!
//! Tokens refill continuously from elapsed [`tokio::time::Instant`] time, so the
//! limiter follows tokio's clock and can be driven by paused time in tests.
//! Waiters queue on a fair async mutex: the first caller to block is the first
//! to be served, and a caller short of tokens sleeps while holding the lock.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// 默认突发容量
pub const DEFAULT_CAPACITY: u32 = 10;
/// 默认补充速率（请求/秒）
pub const DEFAULT_REFILL_PER_SEC: f64 = 4.0;

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl BucketState {
    fn refill(&mut self, now: Instant, capacity: f64, refill_per_sec: f64) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_per_sec).min(capacity);
        self.last_refill = now;
    }
}

/// Continuous-refill token bucket.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Creates a full bucket.
    ///
    /// A zero capacity or a non-positive rate is raised to the smallest usable value
    /// (one token, one token per second); configuration validation rejects those
    /// values before they reach this point.
    #[must_use]
    pub fn new(capacity: u32, refill_per_sec: f64) -> Self {
        let capacity = f64::from(capacity.max(1));
        let refill_per_sec = if refill_per_sec > 0.0 {
            refill_per_sec
        } else {
            1.0
        };
        Self {
            capacity,
            refill_per_sec,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn refill_per_sec(&self) -> f64 {
        self.refill_per_sec
    }

    /// Takes `n` tokens, suspending until they are available. Never rejects.
    ///
    /// Returns how long the caller waited, including time spent queued behind
    /// other waiters.
    pub async fn acquire(&self, n: u32) -> Duration {
        let started = Instant::now();
        let needed = f64::from(n);
        let mut state = self.state.lock().await;
        state.refill(Instant::now(), self.capacity, self.refill_per_sec);

        if state.tokens < needed {
            let deficit = needed - state.tokens;
            let wait = Duration::from_secs_f64(deficit / self.refill_per_sec);
            log::debug!(
                "[rate-limiter] bucket short by {deficit:.2} tokens, waiting {:.3}s",
                wait.as_secs_f64()
            );
            tokio::time::sleep(wait).await;

            // Earned tokens are not capped here: a request larger than the capacity
            // has already paid for itself by waiting.
            let now = Instant::now();
            let earned =
                now.saturating_duration_since(state.last_refill).as_secs_f64() * self.refill_per_sec;
            state.tokens = (state.tokens + earned - needed).clamp(0.0, self.capacity);
            state.last_refill = now;
        } else {
            state.tokens -= needed;
        }

        started.elapsed()
    }

    /// Takes `n` tokens only if they are available right now.
    pub async fn try_acquire(&self, n: u32) -> bool {
        let needed = f64::from(n);
        let mut state = self.state.lock().await;
        state.refill(Instant::now(), self.capacity, self.refill_per_sec);
        if state.tokens >= needed {
            state.tokens -= needed;
            true
        } else {
            false
        }
    }

    /// Tokens currently available, after refill.
    pub async fn available(&self) -> f64 {
        let mut state = self.state.lock().await;
        state.refill(Instant::now(), self.capacity, self.refill_per_sec);
        state.tokens
    }
}

impl Default for TokenBucket {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_REFILL_PER_SEC)
    }
}
