use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const SYNC_RETRY_MAX: u32 = 5;
pub const SYNC_RETRY_DELAY_MS: u64 = 1000;
pub const SYNC_RETRY_BACKOFF_FACTOR: f64 = 2.0;

/// Bounded exponential backoff for sync queue deliveries.
///
/// After the `n`-th failed attempt the next flush is scheduled
/// `base_delay_ms * backoff_factor^n` milliseconds later, until `n` reaches
/// `max_retries`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub backoff_factor: f64,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay_ms: u64, backoff_factor: f64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            backoff_factor,
        }
    }

    pub fn delay_for(&self, retries: u32) -> Duration {
        let exponent = i32::try_from(retries).unwrap_or(i32::MAX);
        let millis = self.base_delay_ms as f64 * self.backoff_factor.powi(exponent);
        if !millis.is_finite() || millis >= u64::MAX as f64 {
            return Duration::from_millis(u64::MAX);
        }
        Duration::from_millis(millis.max(0.0) as u64)
    }

    pub fn is_exhausted(&self, retries: u32) -> bool {
        retries >= self.max_retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            SYNC_RETRY_MAX,
            SYNC_RETRY_DELAY_MS,
            SYNC_RETRY_BACKOFF_FACTOR,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_doubles_from_two_seconds() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (1..=5)
            .map(|retries| policy.delay_for(retries).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![2000, 4000, 8000, 16000, 32000]);
    }

    #[test]
    fn exhaustion_happens_at_max() {
        let policy = RetryPolicy::default();
        assert!(!policy.is_exhausted(4));
        assert!(policy.is_exhausted(5));
    }

    #[test]
    fn huge_exponents_saturate() {
        let policy = RetryPolicy::new(u32::MAX, 1000, 10.0);
        assert_eq!(policy.delay_for(10_000), Duration::from_millis(u64::MAX));
    }
}
