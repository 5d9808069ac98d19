//! Global send-rate limiting.
//!
//! A single [`TokenBucket`] is shared by every worker of a run:
//!
//! - the bucket starts full (`capacity` tokens)
//! - tokens refill continuously at `capacity` per second, never above `capacity`
//! - each granted send consumes one token
//! - a denied caller gets `false` immediately and is expected to back off itself

use std::sync::{Mutex, PoisonError};

use tokio::time::Instant;

use smartmail_common::error::DispatchError;

/// Issues send permits. Implementations must be safe to call from many workers at once.
pub trait RateLimiter: Send + Sync {
    /// Try to take one permit without blocking.
    fn acquire(&self) -> bool;
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket limiter guarded by one mutex.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(capacity: f64) -> Result<Self, DispatchError> {
        if !(capacity.is_finite() && capacity > 0.0) {
            return Err(DispatchError::Config(format!(
                "rate limiter capacity must be a positive number, got {capacity}"
            )));
        }

        Ok(Self {
            capacity,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        })
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Tokens currently in the bucket, as of the last refill.
    pub fn available(&self) -> f64 {
        self.lock().tokens
    }

    /// Refill as of `now`, then try to consume one token.
    ///
    /// An instant earlier than the last refill counts as zero elapsed time.
    pub fn acquire_at(&self, now: Instant) -> bool {
        let mut state = self.lock();

        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.capacity).min(self.capacity);
        // Refilled time is committed on every call so repeated denials don't
        // credit the same interval twice.
        if now > state.last_refill {
            state.last_refill = now;
        }

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            tracing::trace!(tokens = state.tokens, "Rate limit permit denied");
            false
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BucketState> {
        // The critical section cannot leave the state half-updated, so a
        // poisoned lock is still consistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RateLimiter for TokenBucket {
    fn acquire(&self) -> bool {
        self.acquire_at(Instant::now())
    }
}
