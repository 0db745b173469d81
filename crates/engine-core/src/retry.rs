use rand::Rng;
use std::time::Duration;

/// Indicates whether a failure should be retried or treated as terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retry,
    Stop,
}

/// Capped exponential backoff with proportional jitter.
///
/// Attempts are numbered from 1. The delay scheduled after attempt `n` is
/// `min(base_delay * 2^(n-1), max_delay)` plus a uniformly drawn jitter in
/// `[0, delay * jitter_ratio]`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            jitter_ratio: 0.2,
        }
    }
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        jitter_ratio: f64,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: if max_delay.is_zero() {
                base_delay
            } else {
                max_delay
            },
            jitter_ratio: jitter_ratio.clamp(0.0, 1.0),
        }
    }

    /// Policy with no waiting between attempts, handy in tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO, 0.0)
    }

    /// Whether another attempt is allowed after `attempt` failed.
    pub fn allows_retry_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Deterministic part of the delay after a failed `attempt`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }

        let shift = attempt.saturating_sub(1).min(16);
        let factor = 1u128 << shift;
        let base_ms = self.base_delay.as_millis();
        let delay_ms = base_ms.saturating_mul(factor);
        let capped = delay_ms.min(self.max_delay.as_millis());
        Duration::from_millis(capped as u64)
    }

    /// Backoff delay with jitter applied.
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let delay = self.backoff_delay(attempt);
        if delay.is_zero() || self.jitter_ratio <= 0.0 {
            return delay;
        }

        let spread = delay.as_secs_f64() * self.jitter_ratio;
        let jitter = rand::thread_rng().gen_range(0.0..=spread);
        delay + Duration::from_secs_f64(jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_until_capped() {
        let policy = RetryPolicy::new(10, Duration::from_millis(200), Duration::from_secs(5), 0.0);
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(200));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(400));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(800));
        assert_eq!(policy.backoff_delay(6), Duration::from_secs(5));
        assert_eq!(policy.backoff_delay(40), Duration::from_secs(5));
    }

    #[test]
    fn jitter_stays_within_ratio() {
        let policy = RetryPolicy::default();
        for attempt in 1..=5 {
            let base = policy.backoff_delay(attempt);
            let upper = base.mul_f64(1.0 + policy.jitter_ratio) + Duration::from_millis(1);
            for _ in 0..50 {
                let d = policy.jittered_delay(attempt);
                assert!(d >= base && d <= upper, "{d:?} outside [{base:?}, {upper:?}]");
            }
        }
    }

    #[test]
    fn attempts_are_bounded() {
        let policy = RetryPolicy::default();
        assert!(policy.allows_retry_after(1));
        assert!(policy.allows_retry_after(2));
        assert!(!policy.allows_retry_after(3));
        assert_eq!(RetryPolicy::new(0, Duration::ZERO, Duration::ZERO, 0.5).max_attempts, 1);
    }
}
