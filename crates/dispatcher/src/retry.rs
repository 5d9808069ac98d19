use std::time::Duration;

use smartmail_common::config::DispatchConfig;
use smartmail_common::types::FailureKind;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { delay: Duration },
    GiveUp,
}

/// Bounded exponential backoff.
///
/// Attempts are numbered from 0. The delay before attempt `k` (k ≥ 1) is
/// `base_delay * 2^k`, so the defaults (3 attempts, 1s base) wait 2s then 4s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    /// `max_attempts` counts the initial attempt; values below 1 are raised to 1.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn from_config(config: &DispatchConfig) -> Self {
        Self::new(config.max_attempts, config.backoff_base)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff before attempt `attempt`. Saturates instead of overflowing.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .unwrap_or(Duration::MAX)
    }

    /// Decide what follows the failure of attempt `failed_attempt`.
    pub fn decide(&self, failed_attempt: u32, kind: FailureKind) -> RetryDecision {
        if kind == FailureKind::Permanent {
            return RetryDecision::GiveUp;
        }

        let next = failed_attempt.saturating_add(1);
        if next >= self.max_attempts {
            RetryDecision::GiveUp
        } else {
            RetryDecision::Retry {
                delay: self.delay_before(next),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}
