use anyhow::{bail, Result};
use std::time::Duration;

/// Reconnect schedule for the live connection.
///
/// Attempt `n` (1-based) waits `base_delay * 2^(n-1)`. No jitter and no cap
/// other than `max_attempts`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl BackoffPolicy {
    pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

    pub fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts,
        }
    }

    /// Delay before reconnect attempt `attempt` (1-based; 0 is treated as 1)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    /// True when another reconnect may be scheduled after `attempts_made`
    pub fn has_attempts_left(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_delay.is_zero() {
            bail!("Base reconnect delay must be > 0");
        }
        Ok(())
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BASE_DELAY, Self::DEFAULT_MAX_ATTEMPTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_double_per_attempt() {
        let policy = BackoffPolicy::default();
        let delays: Vec<u128> = (1..=5).map(|n| policy.delay_for(n).as_millis()).collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000]);
    }

    #[test]
    fn test_attempt_zero_uses_base_delay() {
        let policy = BackoffPolicy::new(Duration::from_millis(250), 3);
        assert_eq!(policy.delay_for(0), Duration::from_millis(250));
        assert_eq!(policy.delay_for(1), Duration::from_millis(250));
    }

    #[test]
    fn test_large_attempts_saturate() {
        let policy = BackoffPolicy::new(Duration::from_secs(1), u32::MAX);
        // Must not panic on overflow
        let _ = policy.delay_for(u32::MAX);
        assert!(policy.delay_for(40) >= policy.delay_for(32));
    }

    #[test]
    fn test_attempt_budget() {
        let policy = BackoffPolicy::default();
        assert!(policy.has_attempts_left(0));
        assert!(policy.has_attempts_left(4));
        assert!(!policy.has_attempts_left(5));
    }

    #[test]
    fn test_zero_base_delay_rejected() {
        let policy = BackoffPolicy::new(Duration::ZERO, 5);
        let err = policy.validate().unwrap_err();
        assert!(err.to_string().contains("must be > 0"));
        assert!(BackoffPolicy::default().validate().is_ok());
    }
}
