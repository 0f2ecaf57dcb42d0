use std::time::Duration;
use tracing::warn;

/// Bounded exponential backoff for retryable multi-step operations.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self) -> Backoff {
        Backoff {
            policy: self.clone(),
            failures: 0,
            current_delay: self.initial_delay,
        }
    }
}

/// Backoff state for a single retried operation.
#[derive(Debug)]
pub struct Backoff {
    policy: RetryPolicy,
    failures: u32,
    current_delay: Duration,
}

impl Backoff {
    /// Number of failed attempts recorded so far.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Records a failed attempt and returns how long to wait before the next one.
    ///
    /// Returns `None` once the attempt cap is reached.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.failures += 1;
        if self.failures >= self.policy.max_attempts {
            warn!(
                attempts = self.failures,
                max_attempts = self.policy.max_attempts,
                "retry attempts exhausted"
            );
            return None;
        }

        let delay = self.current_delay;
        let next_ms = (self.current_delay.as_millis() as f64 * self.policy.backoff_multiplier) as u64;
        self.current_delay = Duration::from_millis(next_ms).min(self.policy.max_delay);

        Some(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_millis(350),
        }
    }

    #[test]
    fn test_delays_grow_and_are_capped() {
        let mut backoff = policy(10).backoff();

        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(100)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(200)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(350)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(350)));
    }

    #[test]
    fn test_no_delay_once_attempts_exhausted() {
        let mut backoff = policy(3).backoff();

        assert!(backoff.next_delay().is_some()); // after attempt 1
        assert!(backoff.next_delay().is_some()); // after attempt 2
        assert!(backoff.next_delay().is_none()); // attempt 3 was the last
        assert_eq!(backoff.failures(), 3);
    }

    #[test]
    fn test_single_attempt_policy_never_retries() {
        let mut backoff = policy(1).backoff();
        assert!(backoff.next_delay().is_none());
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 10);
        assert_eq!(policy.initial_delay, Duration::from_millis(100));
    }
}
