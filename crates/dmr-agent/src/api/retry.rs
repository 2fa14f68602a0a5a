//! Bounded retry with a fixed delay.
//!
//! The connection bootstrap tries a fixed number of times and waits the same
//! amount between attempts. Whether a failure is worth retrying at all is
//! decided by [`ConnectError::is_transient`](crate::error::ConnectError::is_transient).

use std::time::Duration;

use crate::config::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_SECS};

/// How many times to attempt a connection and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRIES,
            delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
        }
    }
}

impl RetryPolicy {
    /// Create a policy. An attempt bound of 0 is raised to 1.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Total attempts, including the first one. Always at least 1.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait between consecutive attempts. Zero means retry immediately.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// A policy that tries exactly once.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Whether another attempt may follow the given (1-indexed) one.
    pub fn has_attempts_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Human-readable delay for log lines ("3 seconds", "0.25 seconds").
pub fn describe_delay(delay: Duration) -> String {
    let secs = delay.as_secs_f64();
    if secs == 1.0 {
        "1 second".to_string()
    } else {
        format!("{secs} seconds")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay(), Duration::from_secs(3));
    }

    #[test]
    fn zero_attempts_raised_to_one() {
        let policy = RetryPolicy::new(0, Duration::from_secs(1));
        assert_eq!(policy.max_attempts(), 1);
        assert!(!policy.has_attempts_after(1));
    }

    #[test]
    fn attempts_after() {
        let policy = RetryPolicy::new(3, Duration::ZERO);
        assert!(policy.has_attempts_after(1));
        assert!(policy.has_attempts_after(2));
        assert!(!policy.has_attempts_after(3));
    }

    #[test]
    fn delay_descriptions() {
        assert_eq!(describe_delay(Duration::from_secs(3)), "3 seconds");
        assert_eq!(describe_delay(Duration::from_secs(1)), "1 second");
        assert_eq!(describe_delay(Duration::from_millis(250)), "0.25 seconds");
        assert_eq!(describe_delay(Duration::ZERO), "0 seconds");
    }
}
