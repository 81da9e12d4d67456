//! Retry progress reporting

use std::error::Error;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Something that happened inside a retry loop
#[derive(Debug, Clone, Copy)]
pub enum RetryEvent<'a> {
    /// Attempt `attempt` of `max_attempts` is starting
    Attempt { attempt: u32, max_attempts: u32 },

    /// An attempt failed and the next one follows after `delay`
    Backoff {
        attempt: u32,
        error: &'a dyn Error,
        delay: Duration,
    },

    /// The operation succeeded
    Succeeded { attempt: u32, elapsed: Duration },

    /// The last permitted attempt failed
    Exhausted { attempts: u32, error: &'a dyn Error },

    /// The loop ended early on a non-retryable error or a cancelled wait
    Stopped {
        attempt: u32,
        error: Option<&'a dyn Error>,
    },
}

/// Receives [`RetryEvent`]s as a retry loop progresses
pub trait RetryObserver: Send + Sync {
    fn observe(&self, event: RetryEvent<'_>);
}

/// Observer that ignores every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpObserver;

impl RetryObserver for NoOpObserver {
    fn observe(&self, _event: RetryEvent<'_>) {}
}

/// Observer that logs events with `tracing`, labelled by operation
#[derive(Debug, Clone)]
pub struct TracingObserver {
    operation: &'static str,
}

impl TracingObserver {
    pub fn new(operation: &'static str) -> Self {
        Self { operation }
    }
}

impl RetryObserver for TracingObserver {
    fn observe(&self, event: RetryEvent<'_>) {
        let operation = self.operation;
        match event {
            RetryEvent::Attempt {
                attempt,
                max_attempts,
            } => tracing::trace!(operation, attempt, max_attempts, "attempt starting"),
            RetryEvent::Backoff {
                attempt,
                error,
                delay,
            } => tracing::warn!(
                operation,
                attempt,
                error = %error,
                delay_ms = delay.as_millis() as u64,
                "attempt failed, backing off"
            ),
            RetryEvent::Succeeded { attempt, elapsed } if attempt > 1 => tracing::info!(
                operation,
                attempt,
                elapsed_ms = elapsed.as_millis() as u64,
                "succeeded after retry"
            ),
            RetryEvent::Succeeded { .. } => {}
            RetryEvent::Exhausted { attempts, error } => {
                tracing::error!(operation, attempts, error = %error, "retries exhausted")
            }
            RetryEvent::Stopped { attempt, error } => match error {
                Some(error) => tracing::debug!(operation, attempt, error = %error, "retry stopped"),
                None => tracing::debug!(operation, attempt, "retry stopped"),
            },
        }
    }
}

/// Observer that counts events, for tests and diagnostics
#[derive(Debug, Default)]
pub struct StatsObserver {
    attempts: AtomicU32,
    backoffs: AtomicU32,
    successes: AtomicU32,
    exhaustions: AtomicU32,
    stops: AtomicU32,
}

impl StatsObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts started
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Failed attempts followed by a wait
    pub fn backoffs(&self) -> u32 {
        self.backoffs.load(Ordering::Relaxed)
    }

    pub fn successes(&self) -> u32 {
        self.successes.load(Ordering::Relaxed)
    }

    pub fn exhaustions(&self) -> u32 {
        self.exhaustions.load(Ordering::Relaxed)
    }

    /// Loops ended early
    pub fn stops(&self) -> u32 {
        self.stops.load(Ordering::Relaxed)
    }
}

impl RetryObserver for StatsObserver {
    fn observe(&self, event: RetryEvent<'_>) {
        let counter = match event {
            RetryEvent::Attempt { .. } => &self.attempts,
            RetryEvent::Backoff { .. } => &self.backoffs,
            RetryEvent::Succeeded { .. } => &self.successes,
            RetryEvent::Exhausted { .. } => &self.exhaustions,
            RetryEvent::Stopped { .. } => &self.stops,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

impl<T: RetryObserver + ?Sized> RetryObserver for std::sync::Arc<T> {
    fn observe(&self, event: RetryEvent<'_>) {
        (**self).observe(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_stats_observer_counts_events() {
        let observer = StatsObserver::new();
        let error = io::Error::other("unavailable");

        for attempt in 1..=3 {
            observer.observe(RetryEvent::Attempt {
                attempt,
                max_attempts: 3,
            });
            if attempt < 3 {
                observer.observe(RetryEvent::Backoff {
                    attempt,
                    error: &error,
                    delay: Duration::from_millis(10),
                });
            }
        }
        observer.observe(RetryEvent::Exhausted {
            attempts: 3,
            error: &error,
        });

        assert_eq!(observer.attempts(), 3);
        assert_eq!(observer.backoffs(), 2);
        assert_eq!(observer.exhaustions(), 1);
        assert_eq!(observer.successes(), 0);
        assert_eq!(observer.stops(), 0);
    }
}
