//! Retry execution loop

use std::error::Error;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::types::RetryPolicy;

use super::error::RetryError;
use super::observer::{NoOpObserver, RetryEvent, RetryObserver};
use super::strategies::{calculate_delay, AlwaysRetry, RetryPredicate};

/// Builder for a [`RetryExecutor`]
///
/// ```rust
/// use gatekey_core::retry::{HttpStatusPredicate, RetryExecutorBuilder, TracingObserver};
/// use gatekey_core::types::RetryPolicy;
///
/// let executor = RetryExecutorBuilder::new()
///     .with_policy(RetryPolicy::default())
///     .with_predicate(HttpStatusPredicate::with_codes(vec![500]))
///     .with_observer(TracingObserver::new("resolve"))
///     .build();
/// ```
pub struct RetryExecutorBuilder<P = AlwaysRetry> {
    executor: RetryExecutor<P>,
}

impl Default for RetryExecutorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryExecutorBuilder {
    /// Default policy, retry everything, no observer, jitter on
    pub fn new() -> Self {
        Self {
            executor: RetryExecutor {
                policy: RetryPolicy::default(),
                predicate: AlwaysRetry,
                observer: Arc::new(NoOpObserver),
                jitter: true,
                cancel: None,
            },
        }
    }
}

impl<P> RetryExecutorBuilder<P> {
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.executor.policy = policy;
        self
    }

    /// Decide per error whether another attempt is made
    pub fn with_predicate<Q>(self, predicate: Q) -> RetryExecutorBuilder<Q> {
        let RetryExecutor {
            policy,
            observer,
            jitter,
            cancel,
            ..
        } = self.executor;
        RetryExecutorBuilder {
            executor: RetryExecutor {
                policy,
                predicate,
                observer,
                jitter,
                cancel,
            },
        }
    }

    pub fn with_observer(mut self, observer: impl RetryObserver + 'static) -> Self {
        self.executor.observer = Arc::new(observer);
        self
    }

    /// Add up to 25% random jitter to each delay (on by default)
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.executor.jitter = jitter;
        self
    }

    /// Abort the wait between attempts when `token` is cancelled
    ///
    /// An attempt already in flight is not interrupted.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.executor.cancel = Some(token);
        self
    }

    pub fn build(self) -> RetryExecutor<P> {
        self.executor
    }
}

/// Runs an operation under a [`RetryPolicy`]
pub struct RetryExecutor<P> {
    policy: RetryPolicy,
    predicate: P,
    observer: Arc<dyn RetryObserver>,
    jitter: bool,
    cancel: Option<CancellationToken>,
}

impl<P> RetryExecutor<P> {
    /// Run `op` until it succeeds, the predicate rejects its error, the
    /// policy runs out of attempts, or the wait is cancelled
    pub async fn execute<F, Fut, T, E>(&self, mut op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Error + 'static,
        P: RetryPredicate<E>,
    {
        let started = Instant::now();
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.observer.observe(RetryEvent::Attempt {
                attempt,
                max_attempts,
            });

            let error = match op().await {
                Ok(value) => {
                    self.observer.observe(RetryEvent::Succeeded {
                        attempt,
                        elapsed: started.elapsed(),
                    });
                    return Ok(value);
                }
                Err(error) => error,
            };

            if !self.predicate.should_retry(&error) {
                self.observer.observe(RetryEvent::Stopped {
                    attempt,
                    error: Some(&error),
                });
                return Err(RetryError::NonRetryable(error));
            }

            if attempt >= max_attempts {
                self.observer.observe(RetryEvent::Exhausted {
                    attempts: attempt,
                    error: &error,
                });
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    source: error,
                    elapsed: started.elapsed(),
                });
            }

            let delay = calculate_delay(&self.policy, attempt, self.jitter);
            self.observer.observe(RetryEvent::Backoff {
                attempt,
                error: &error,
                delay,
            });

            let Some(token) = &self.cancel else {
                tokio::time::sleep(delay).await;
                continue;
            };
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    self.observer.observe(RetryEvent::Stopped {
                        attempt,
                        error: Some(&error),
                    });
                    return Err(RetryError::Cancelled {
                        attempts: attempt,
                        last_error: Some(error),
                    });
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::observer::StatsObserver;
    use crate::retry::strategies::{HttpStatusError, HttpStatusPredicate};
    use crate::types::RetryStrategy;
    use std::io;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn quick_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            strategy: RetryStrategy::FixedDelay,
            backoff_multiplier: 1.0,
            initial_delay_ms: 5,
            max_delay_ms: 5,
        }
    }

    #[derive(Debug, thiserror::Error)]
    #[error("status {0}")]
    struct StatusError(u16);

    impl HttpStatusError for StatusError {
        fn status_code(&self) -> Option<u16> {
            Some(self.0)
        }
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let observer = Arc::new(StatsObserver::new());

        let result: Result<u32, RetryError<io::Error>> = RetryExecutorBuilder::new()
            .with_policy(quick_policy(3))
            .with_observer(observer.clone())
            .build()
            .execute(|| async { Ok(7) })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(observer.attempts(), 1);
        assert_eq!(observer.backoffs(), 0);
    }

    #[tokio::test]
    async fn test_recovers_within_budget() {
        let observer = Arc::new(StatsObserver::new());
        let calls = AtomicU32::new(0);

        let result: Result<&str, RetryError<io::Error>> = RetryExecutorBuilder::new()
            .with_policy(quick_policy(3))
            .with_observer(observer.clone())
            .build()
            .execute(|| {
                let call = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if call < 2 {
                        Err(io::Error::other("flaky"))
                    } else {
                        Ok("resolved")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "resolved");
        assert_eq!(observer.attempts(), 3);
        assert_eq!(observer.backoffs(), 2);
        assert_eq!(observer.successes(), 1);
    }

    #[tokio::test]
    async fn test_exhausts_budget() {
        let observer = Arc::new(StatsObserver::new());

        let result: Result<(), RetryError<io::Error>> = RetryExecutorBuilder::new()
            .with_policy(quick_policy(3))
            .with_observer(observer.clone())
            .build()
            .execute(|| async { Err(io::Error::other("down")) })
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, RetryError::Exhausted { attempts: 3, .. }));
        assert_eq!(observer.backoffs(), 2);
        assert_eq!(observer.exhaustions(), 1);
    }

    #[tokio::test]
    async fn test_terminal_status_is_not_retried() {
        let observer = Arc::new(StatsObserver::new());

        let result: Result<(), RetryError<StatusError>> = RetryExecutorBuilder::new()
            .with_policy(quick_policy(3))
            .with_predicate(HttpStatusPredicate::with_codes(vec![500]))
            .with_observer(observer.clone())
            .build()
            .execute(|| async { Err(StatusError(404)) })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.attempts(), 1);
        assert_eq!(err.into_last_error().map(|e| e.0), Some(404));
        assert_eq!(observer.stops(), 1);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let calls = AtomicU32::new(0);

        let result: Result<(), RetryError<io::Error>> = RetryExecutorBuilder::new()
            .with_policy(quick_policy(0))
            .build()
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(io::Error::other("down")) }
            })
            .await;

        assert!(matches!(result, Err(RetryError::Exhausted { attempts: 1, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancellation_cuts_backoff_short() {
        let token = CancellationToken::new();
        let policy = RetryPolicy {
            initial_delay_ms: 60_000,
            max_delay_ms: 60_000,
            ..quick_policy(5)
        };

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let result: Result<(), RetryError<io::Error>> = RetryExecutorBuilder::new()
            .with_policy(policy)
            .with_cancellation(token)
            .build()
            .execute(|| async { Err(io::Error::other("down")) })
            .await;

        assert!(matches!(result, Err(RetryError::Cancelled { attempts: 1, .. })));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
