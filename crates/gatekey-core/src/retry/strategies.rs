//! Backoff delays and retry predicates

use std::time::Duration;

use crate::types::{RetryPolicy, RetryStrategy};

/// Undelayed backoff for the wait after failed attempt `attempt` (1-based)
fn base_delay_ms(policy: &RetryPolicy, attempt: u32) -> u64 {
    let steps = attempt.saturating_sub(1);
    match policy.strategy {
        RetryStrategy::None => 0,
        RetryStrategy::FixedDelay => policy.initial_delay_ms,
        RetryStrategy::LinearBackoff => policy.initial_delay_ms.saturating_mul(u64::from(steps) + 1),
        RetryStrategy::ExponentialBackoff => {
            let factor = policy.backoff_multiplier.powi(steps.min(i32::MAX as u32) as i32);
            // float to int casts saturate
            (policy.initial_delay_ms as f64 * factor) as u64
        }
    }
}

/// Delay before the attempt that follows failed attempt `attempt`
///
/// The delay is capped at `max_delay_ms`; jitter then adds up to a quarter
/// of the capped value.
///
/// ```rust
/// use gatekey_core::retry::calculate_delay;
/// use gatekey_core::types::{RetryPolicy, RetryStrategy};
///
/// let policy = RetryPolicy {
///     max_attempts: 4,
///     strategy: RetryStrategy::ExponentialBackoff,
///     backoff_multiplier: 2.0,
///     initial_delay_ms: 50,
///     max_delay_ms: 150,
/// };
///
/// assert_eq!(calculate_delay(&policy, 1, false).as_millis(), 50);
/// assert_eq!(calculate_delay(&policy, 2, false).as_millis(), 100);
/// assert_eq!(calculate_delay(&policy, 3, false).as_millis(), 150);
/// ```
pub fn calculate_delay(policy: &RetryPolicy, attempt: u32, jitter: bool) -> Duration {
    let delay_ms = base_delay_ms(policy, attempt).min(policy.max_delay_ms);
    let jitter_ms = if jitter && delay_ms >= 4 {
        rand::random_range(0..=delay_ms / 4)
    } else {
        0
    };
    Duration::from_millis(delay_ms + jitter_ms)
}

/// Decides whether an error is worth another attempt
pub trait RetryPredicate<E: ?Sized>: Send + Sync {
    fn should_retry(&self, error: &E) -> bool;
}

/// Retries every error
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysRetry;

impl<E: ?Sized> RetryPredicate<E> for AlwaysRetry {
    fn should_retry(&self, _error: &E) -> bool {
        true
    }
}

/// An attempt error that may carry an HTTP response status
pub trait HttpStatusError {
    /// `None` when no usable response arrived
    fn status_code(&self) -> Option<u16>;
}

/// Retries the listed statuses and every error without a status
#[derive(Debug, Clone)]
pub struct HttpStatusPredicate {
    codes: Vec<u16>,
}

impl HttpStatusPredicate {
    pub fn with_codes(codes: Vec<u16>) -> Self {
        Self { codes }
    }
}

impl<E: HttpStatusError> RetryPredicate<E> for HttpStatusPredicate {
    fn should_retry(&self, error: &E) -> bool {
        match error.status_code() {
            Some(code) => self.codes.contains(&code),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(strategy: RetryStrategy) -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            strategy,
            backoff_multiplier: 3.0,
            initial_delay_ms: 10,
            max_delay_ms: 60_000,
        }
    }

    fn delays(policy: &RetryPolicy, attempts: u32) -> Vec<u64> {
        (1..=attempts)
            .map(|attempt| calculate_delay(policy, attempt, false).as_millis() as u64)
            .collect()
    }

    #[test]
    fn test_strategy_shapes() {
        assert_eq!(delays(&policy(RetryStrategy::None), 3), vec![0, 0, 0]);
        assert_eq!(delays(&policy(RetryStrategy::FixedDelay), 3), vec![10, 10, 10]);
        assert_eq!(delays(&policy(RetryStrategy::LinearBackoff), 3), vec![10, 20, 30]);
        assert_eq!(
            delays(&policy(RetryStrategy::ExponentialBackoff), 4),
            vec![10, 30, 90, 270]
        );
    }

    #[test]
    fn test_delay_is_capped() {
        let capped = RetryPolicy {
            max_delay_ms: 75,
            ..policy(RetryStrategy::ExponentialBackoff)
        };
        assert_eq!(delays(&capped, 4), vec![10, 30, 75, 75]);
        assert_eq!(calculate_delay(&capped, u32::MAX, false), Duration::from_millis(75));
    }

    #[test]
    fn test_jitter_stays_within_a_quarter() {
        let fixed = RetryPolicy {
            initial_delay_ms: 400,
            ..policy(RetryStrategy::FixedDelay)
        };
        for _ in 0..64 {
            let delay = calculate_delay(&fixed, 1, true).as_millis();
            assert!((400..=500).contains(&delay));
        }
        assert_eq!(
            calculate_delay(&policy(RetryStrategy::None), 1, true),
            Duration::ZERO
        );
    }

    struct Status(Option<u16>);

    impl HttpStatusError for Status {
        fn status_code(&self) -> Option<u16> {
            self.0
        }
    }

    #[test]
    fn test_http_status_predicate() {
        let predicate = HttpStatusPredicate::with_codes(vec![500]);

        assert!(predicate.should_retry(&Status(Some(500))));
        assert!(predicate.should_retry(&Status(None)));
        assert!(!predicate.should_retry(&Status(Some(404))));
        assert!(!predicate.should_retry(&Status(Some(503))));
    }
}
