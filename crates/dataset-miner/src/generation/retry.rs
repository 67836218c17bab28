//! Bounded retry with exponential backoff

use std::time::Duration;

use crate::config::RetryConfig;

/// How often and how patiently a failed call is retried
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            multiplier: config.multiplier.max(1.0),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// Delay after failed attempt number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let secs = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = secs.min(self.max_backoff.as_secs_f64());
        Duration::from_secs_f64(capped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_backoff_sequence() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(4));
        assert_eq!(policy.backoff(10), Duration::from_secs(30));
    }

    #[test]
    fn test_zero_attempts_clamped() {
        let policy = RetryPolicy::from_config(&RetryConfig {
            max_attempts: 0,
            ..RetryConfig::default()
        });
        assert_eq!(policy.max_attempts, 1);
    }
}
