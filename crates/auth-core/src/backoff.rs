//! Retry delay schedule for transient token-endpoint failures
//!
//! Quadratic rather than exponential: with a low attempt cap on an
//! interactive tool, 1s/4s/9s spaces retries enough to clear transient
//! network blips without the long tail an exponential schedule grows.

use std::time::Duration;

/// Pure delay schedule: `delay(attempt) = base * attempt²`.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    /// Base delay multiplied by the squared attempt number.
    pub base: Duration,
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
}

impl BackoffPolicy {
    pub fn new(base: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Delay to wait after the given 1-based attempt fails.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base * attempt.saturating_mul(attempt)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max_attempts: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quadratic_schedule_with_one_second_base() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.delay(2), Duration::from_secs(4));
        assert_eq!(policy.delay(3), Duration::from_secs(9));
    }

    #[test]
    fn scales_with_base() {
        let policy = BackoffPolicy::new(Duration::from_millis(250), 2);
        assert_eq!(policy.delay(2), Duration::from_secs(1));
    }

    #[test]
    fn attempt_cap_is_at_least_one() {
        let policy = BackoffPolicy::new(Duration::from_secs(1), 0);
        assert_eq!(policy.max_attempts, 1);
    }
}
