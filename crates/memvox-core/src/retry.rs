//! Bounded retry policy for external collaborator calls.
//!
//! Attached at the LLM and identity-provider call sites; never at the
//! memory-store write sites, where a blind retry could double-write.
//! Callers decide retryability per error kind (see `LlmError::is_retryable`);
//! the policy only answers "how many attempts" and "how long to wait".

use std::time::Duration;

/// Exponential backoff schedule with a hard attempt cap.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first try.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Backoff multiplier applied per subsequent attempt.
    pub multiplier: u32,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, multiplier: u32) -> Self {
        Self {
            max_attempts,
            base_delay,
            multiplier,
        }
    }

    /// Whether another attempt is allowed after `attempt` failures.
    /// `attempt` is 1-based (first execution is attempt 1).
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    /// Three attempts with a 60s base and 5x backoff (60s, 5m between
    /// attempts), matching the extraction pipeline's tolerance for slow
    /// provider recovery.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(60),
            multiplier: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_retry_within_limit() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!policy.should_retry(4));
    }

    #[test]
    fn test_single_attempt_never_retries() {
        let policy = RetryPolicy::new(1, Duration::from_millis(10), 2);
        assert!(!policy.should_retry(1));
    }

    #[test]
    fn test_delay_progression() {
        let policy = RetryPolicy::new(4, Duration::from_secs(60), 5);
        assert_eq!(policy.delay_for(1), Duration::from_secs(60));
        assert_eq!(policy.delay_for(2), Duration::from_secs(300));
        assert_eq!(policy.delay_for(3), Duration::from_secs(1500));
    }

    #[test]
    fn test_default_is_three_attempts() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_for(1), Duration::from_secs(60));
        assert_eq!(policy.delay_for(2), Duration::from_secs(300));
    }
}
