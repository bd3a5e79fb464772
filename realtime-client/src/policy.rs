use std::time::Duration;

/// Delay curve between reconnect attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// The same delay before every attempt.
    Fixed(Duration),
    /// `initial`, doubled per consecutive failure, capped at `max`.
    Exponential { initial: Duration, max: Duration },
}

impl Backoff {
    /// Delay before the reconnect that follows the `failures`-th consecutive failure.
    pub fn delay(&self, failures: u32) -> Duration {
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { initial, max } => {
                let factor = 2u32.saturating_pow(failures.saturating_sub(1));
                initial.saturating_mul(factor).min(max)
            }
        }
    }
}

/// How a [`ConnectionManager`](crate::ConnectionManager) recovers from
/// connection failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Consecutive failed attempts after which the manager gives up.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl ReconnectPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed(delay),
        }
    }

    pub fn exponential(max_attempts: u32, initial: Duration, max: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Exponential { initial, max },
        }
    }

    /// Whether another attempt is allowed after `failures` consecutive failures.
    pub fn allows(&self, failures: u32) -> bool {
        failures < self.max_attempts
    }

    pub fn delay_for(&self, failures: u32) -> Duration {
        self.backoff.delay(failures)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(5, Duration::from_secs(3))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_five_attempts_three_seconds_apart() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        for failures in 1..=5 {
            assert_eq!(policy.delay_for(failures), Duration::from_secs(3));
        }
    }

    #[test]
    fn allows_stops_at_the_cap() {
        let policy = ReconnectPolicy::default();
        assert!(policy.allows(4));
        assert!(!policy.allows(5));
        assert!(!ReconnectPolicy::fixed(0, Duration::ZERO).allows(0));
    }

    #[test]
    fn exponential_backoff_doubles_and_caps() {
        let policy = ReconnectPolicy::exponential(
            10,
            Duration::from_millis(500),
            Duration::from_secs(5),
        );
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_secs(1));
        assert_eq!(policy.delay_for(4), Duration::from_secs(4));
        assert_eq!(policy.delay_for(5), Duration::from_secs(5));
        assert_eq!(policy.delay_for(40), Duration::from_secs(5));
    }
}
