//! Reconnection backoff policy for the signaling channel

use std::time::Duration;

/// Strategy for re-establishing the signaling connection after loss.
///
/// Reconnection is always bounded; once the budget is spent the channel
/// reports a terminal disconnect instead of retrying forever.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconnectionStrategy {
    /// No automatic reconnection.
    None,

    /// Fixed delay between attempts.
    Fixed {
        /// Delay between attempts.
        delay: Duration,
        /// Maximum number of attempts.
        max_attempts: u32,
    },

    /// Exponential backoff between attempts.
    ExponentialBackoff {
        /// Initial delay before the first retry.
        initial_delay: Duration,
        /// Ceiling for the computed delay.
        max_delay: Duration,
        /// Multiplier for each subsequent attempt.
        multiplier: f64,
        /// Maximum number of attempts.
        max_attempts: u32,
    },
}

impl Default for ReconnectionStrategy {
    fn default() -> Self {
        Self::ExponentialBackoff {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            max_attempts: 10,
        }
    }
}

impl ReconnectionStrategy {
    /// Creates a fixed delay strategy.
    pub fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self::Fixed {
            delay,
            max_attempts,
        }
    }

    /// Calculates the delay for the given attempt number.
    ///
    /// Returns `None` once the attempt budget is exhausted.
    pub fn calculate_delay(&self, attempt: u32) -> Option<Duration> {
        match self {
            Self::None => None,
            Self::Fixed {
                delay,
                max_attempts,
            } => {
                if attempt >= *max_attempts {
                    return None;
                }
                Some(*delay)
            }
            Self::ExponentialBackoff {
                initial_delay,
                max_delay,
                multiplier,
                max_attempts,
            } => {
                if attempt >= *max_attempts {
                    return None;
                }
                let delay = initial_delay.mul_f64(multiplier.powi(attempt as i32));
                Some(delay.min(*max_delay))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_bounded_backoff() {
        let strategy = ReconnectionStrategy::default();
        match strategy {
            ReconnectionStrategy::ExponentialBackoff {
                initial_delay,
                max_delay,
                multiplier,
                max_attempts,
            } => {
                assert_eq!(initial_delay, Duration::from_secs(1));
                assert_eq!(max_delay, Duration::from_secs(60));
                assert_eq!(multiplier, 2.0);
                assert_eq!(max_attempts, 10);
            }
            _ => panic!("Expected ExponentialBackoff"),
        }
    }

    #[test]
    fn test_fixed_strategy() {
        let strategy = ReconnectionStrategy::fixed(Duration::from_secs(5), 3);
        assert_eq!(strategy.calculate_delay(0), Some(Duration::from_secs(5)));
        assert_eq!(strategy.calculate_delay(2), Some(Duration::from_secs(5)));
        assert_eq!(strategy.calculate_delay(3), None);
        assert_eq!(strategy.calculate_delay(4), None);
    }

    #[test]
    fn test_exponential_backoff_growth() {
        let strategy = ReconnectionStrategy::ExponentialBackoff {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            max_attempts: 20,
        };

        assert_eq!(
            strategy.calculate_delay(0),
            Some(Duration::from_millis(100))
        );
        assert_eq!(
            strategy.calculate_delay(1),
            Some(Duration::from_millis(200))
        );
        assert_eq!(
            strategy.calculate_delay(2),
            Some(Duration::from_millis(400))
        );
        // 100ms * 2^10 overshoots the ceiling and is capped.
        assert_eq!(strategy.calculate_delay(10), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_exponential_backoff_budget() {
        let strategy = ReconnectionStrategy::ExponentialBackoff {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            max_attempts: 5,
        };
        assert!(strategy.calculate_delay(4).is_some());
        assert!(strategy.calculate_delay(5).is_none());
    }

    #[test]
    fn test_none_strategy() {
        assert!(ReconnectionStrategy::None.calculate_delay(0).is_none());
    }
}
