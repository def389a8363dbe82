//! Retry budget and exponential backoff.
//!
//! `delay(n) = min(base_delay * 2^n, max_delay)`, perturbed by up to
//! `±jitter` of that value so that items failing together do not retry in
//! lockstep.

use rand::Rng;
use std::time::Duration;

/// Retry configuration shared by the queue and its scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Application failures allowed before an item becomes `FAILED`.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound for the un-jittered delay.
    pub max_delay: Duration,
    /// Relative jitter, `0.1` means ±10%.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(300_000),
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_delays(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Whether `retry_count` application failures use up the budget.
    pub fn is_exhausted(&self, retry_count: u32) -> bool {
        retry_count >= self.max_retries
    }

    /// The capped exponential delay, before jitter.
    pub fn base_backoff(&self, retry_count: u32) -> Duration {
        let base = self.base_delay.as_millis();
        let max = self.max_delay.as_millis();
        let factor = 1u128.checked_shl(retry_count.min(64)).unwrap_or(u128::MAX);
        let millis = base.saturating_mul(factor).min(max);
        Duration::from_millis(millis.min(u64::MAX as u128) as u64)
    }

    /// The jittered delay before attempt `retry_count + 1`.
    pub fn backoff_delay(&self, retry_count: u32) -> Duration {
        let sample = rand::thread_rng().gen_range(-1.0..=1.0);
        self.backoff_with_sample(retry_count, sample)
    }

    /// Deterministic variant of [`backoff_delay`](Self::backoff_delay).
    ///
    /// `sample` in `[-1.0, 1.0]` picks the point inside the jitter band.
    pub fn backoff_with_sample(&self, retry_count: u32, sample: f64) -> Duration {
        let base = self.base_backoff(retry_count).as_secs_f64();
        let offset = base * self.jitter * sample.clamp(-1.0, 1.0);
        Duration::from_secs_f64((base + offset).max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.base_backoff(0), Duration::from_millis(1_000));
        assert_eq!(policy.base_backoff(1), Duration::from_millis(2_000));
        assert_eq!(policy.base_backoff(3), Duration::from_millis(8_000));
        assert_eq!(policy.base_backoff(9), Duration::from_millis(300_000));
        assert_eq!(policy.base_backoff(200), Duration::from_millis(300_000));
    }

    #[test]
    fn test_jitter_band_edges() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.backoff_with_sample(0, 1.0),
            Duration::from_millis(1_100)
        );
        assert_eq!(
            policy.backoff_with_sample(0, -1.0),
            Duration::from_millis(900)
        );
    }

    #[test]
    fn test_exhaustion() {
        let policy = RetryPolicy::default();
        assert!(!policy.is_exhausted(4));
        assert!(policy.is_exhausted(5));
    }

    proptest! {
        #[test]
        fn backoff_is_non_decreasing(n in 0u32..100) {
            let policy = RetryPolicy::default();
            prop_assert!(policy.base_backoff(n) <= policy.base_backoff(n + 1));
            prop_assert!(policy.base_backoff(n) <= policy.max_delay);
        }

        #[test]
        fn jittered_delay_within_ten_percent(n in 0u32..40) {
            let policy = RetryPolicy::default();
            let base = policy.base_backoff(n).as_secs_f64();
            let got = policy.backoff_delay(n).as_secs_f64();
            // Tolerance for f64 -> Duration rounding.
            prop_assert!(got >= base * 0.9 - 1e-6);
            prop_assert!(got <= base * 1.1 + 1e-6);
        }
    }
}
