//! Retry policy for failed publish attempts.

use chrono::TimeDelta;
use outpost_core::WorkerConfig;

/// Default ceiling for a single backoff delay.
pub const MAX_RETRY_BACKOFF_SECS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: i32,
    pub max_backoff_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            max_backoff_secs: MAX_RETRY_BACKOFF_SECS,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            max_backoff_secs: config.max_backoff_secs,
        }
    }

    /// Whether a record that has now failed `attempts` times gets another try.
    pub fn should_retry(&self, attempts: i32) -> bool {
        attempts < self.max_attempts
    }

    /// `2^attempts` seconds, capped at `max_backoff_secs`.
    #[inline]
    pub fn backoff_seconds(&self, attempts: i32) -> u64 {
        let exponent = u32::try_from(attempts).unwrap_or(0);
        2_u64
            .checked_pow(exponent)
            .unwrap_or(u64::MAX)
            .min(self.max_backoff_secs)
    }

    pub fn backoff(&self, attempts: i32) -> TimeDelta {
        i64::try_from(self.backoff_seconds(attempts))
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_backoff_exponential_then_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_seconds(1), 2);
        assert_eq!(policy.backoff_seconds(2), 4);
        assert_eq!(policy.backoff_seconds(8), 256);
        assert_eq!(policy.backoff_seconds(9), MAX_RETRY_BACKOFF_SECS);
        assert_eq!(policy.backoff_seconds(200), MAX_RETRY_BACKOFF_SECS);
    }

    #[test]
    fn backoff_never_decreases() {
        let policy = RetryPolicy {
            max_attempts: 100,
            max_backoff_secs: u64::MAX,
        };
        let delays: Vec<u64> = (1..80).map(|n| policy.backoff_seconds(n)).collect();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(policy.backoff(70), TimeDelta::MAX);
    }

    #[test]
    fn default_attempts_stop_at_three() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }

    #[test]
    fn from_config_copies_worker_settings() {
        let config = WorkerConfig {
            max_attempts: 5,
            max_backoff_secs: 60,
            ..WorkerConfig::default()
        };
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.backoff(10), TimeDelta::seconds(60));
    }
}
