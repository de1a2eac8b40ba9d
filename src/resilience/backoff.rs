//! Exponential backoff schedule shared by every retried external call.

use std::time::Duration;

use crate::config::ResilienceConfig;

/// Tunable parameters for retrying an external call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, the first call included.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub base_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl From<&ResilienceConfig> for RetryPolicy {
    fn from(config: &ResilienceConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            ..Default::default()
        }
    }
}

impl RetryPolicy {
    /// Policy with no waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    /// Attempt budget, never less than one.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to wait after the given (1-based) failed attempt.
    ///
    /// Grows by `multiplier` per attempt and is clamped to `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let mut delay = self.base_delay.min(self.max_delay);
        for _ in 1..attempt {
            delay = next_delay(delay, self);
            if delay == self.max_delay {
                break;
            }
        }
        delay
    }
}

/// Calculate the next backoff delay from the current delay.
///
/// The result is clamped to [`RetryPolicy::max_delay`]. A product that does
/// not fit a `Duration` also yields the cap.
pub fn next_delay(current: Duration, policy: &RetryPolicy) -> Duration {
    Duration::try_from_secs_f64(current.as_secs_f64() * policy.multiplier)
        .map_or(policy.max_delay, |next| next.min(policy.max_delay))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_delay_doubles() {
        let policy = RetryPolicy::default();
        let d = next_delay(Duration::from_secs(1), &policy);
        assert_eq!(d, Duration::from_secs(2));
    }

    #[test]
    fn next_delay_clamps_at_max() {
        let policy = RetryPolicy {
            max_delay: Duration::from_secs(10),
            ..Default::default()
        };
        let d = next_delay(Duration::from_secs(8), &policy);
        assert_eq!(d, Duration::from_secs(10));
    }

    fn assert_close(actual: Duration, expected: Duration) {
        let diff = actual.as_nanos().abs_diff(expected.as_nanos());
        assert!(diff <= 1, "{actual:?} != {expected:?}");
    }

    #[test]
    fn sub_millisecond_delays_keep_growing() {
        let policy = RetryPolicy {
            base_delay: Duration::from_micros(400),
            ..Default::default()
        };
        assert_close(policy.delay_for(2), Duration::from_micros(800));
        assert_close(policy.delay_for(3), Duration::from_micros(1600));
    }

    #[test]
    fn fractional_multiplier_keeps_growing() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(1),
            multiplier: 1.5,
            ..Default::default()
        };
        let delays: Vec<Duration> = (1..=4).map(|a| policy.delay_for(a)).collect();
        assert!(delays.windows(2).all(|w| w[1] > w[0]));
        assert_close(delays[1], Duration::from_micros(1500));
    }

    #[test]
    fn overflowing_product_is_capped() {
        let policy = RetryPolicy {
            multiplier: f64::INFINITY,
            ..Default::default()
        };
        assert_eq!(next_delay(Duration::from_secs(1), &policy), policy.max_delay);
    }

    #[test]
    fn delays_increase_then_stay_capped() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (1..=8).map(|a| policy.delay_for(a).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30, 30]);

        for pair in delays.windows(2) {
            assert!(pair[1] > pair[0] || pair[1] == 30);
        }
    }

    #[test]
    fn base_above_cap_is_clamped() {
        let policy = RetryPolicy {
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(5),
            ..Default::default()
        };
        assert_eq!(policy.delay_for(1), Duration::from_secs(5));
    }

    #[test]
    fn from_config() {
        let config = ResilienceConfig {
            max_attempts: 4,
            base_delay_ms: 250,
            max_delay_ms: 2000,
        };
        let policy = RetryPolicy::from(&config);
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.delay_for(1), Duration::from_millis(250));
        assert_eq!(policy.delay_for(3), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(5), Duration::from_millis(2000));
    }

    #[test]
    fn zero_attempts_still_calls_once() {
        assert_eq!(RetryPolicy::immediate(0).attempts(), 1);
    }
}
