//! Terminal outcomes of a retried operation

use std::time::Duration;

/// Why a retried operation gave up
///
/// Generic over `E`, the error type of a single attempt.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// Every permitted attempt failed with a retryable error
    #[error("gave up after {attempts} attempts in {elapsed:?}: {source}")]
    Exhausted {
        attempts: u32,
        source: E,
        elapsed: Duration,
    },

    /// The wait before the next attempt was cancelled
    #[error("cancelled after {attempts} attempts")]
    Cancelled { attempts: u32, last_error: Option<E> },

    /// The predicate rejected the error, so no further attempt was made
    #[error("not retryable: {0}")]
    NonRetryable(#[source] E),
}

impl<E> RetryError<E> {
    /// Number of attempts made before giving up
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } | RetryError::Cancelled { attempts, .. } => *attempts,
            RetryError::NonRetryable(_) => 1,
        }
    }

    /// The error of the last attempt, if one was recorded
    pub fn into_last_error(self) -> Option<E> {
        match self {
            RetryError::Exhausted { source, .. } | RetryError::NonRetryable(source) => Some(source),
            RetryError::Cancelled { last_error, .. } => last_error,
        }
    }
}
