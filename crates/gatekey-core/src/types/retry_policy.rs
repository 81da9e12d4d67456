//! How the auth client paces repeated calls after a retryable failure
//!
//! A call is retried after a transport error, an undecodable body or an
//! HTTP 500 from the auth service. Missing keys fall back to the
//! `DEFAULT_*` values below.

use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 100;
pub const DEFAULT_MAX_DELAY_MS: u64 = 5000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RetryPolicy {
    /// Upper bound on calls to the auth service for one lookup, counting the
    /// first. Once reached the lookup fails with 500.
    pub max_attempts: u32,

    pub strategy: RetryStrategy,

    /// Growth factor between consecutive waits; only read by
    /// [`RetryStrategy::ExponentialBackoff`]
    pub backoff_multiplier: f64,

    /// Wait before the second call, in milliseconds
    pub initial_delay_ms: u64,

    /// Ceiling on any single wait, in milliseconds. Jitter is added on top.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            strategy: RetryStrategy::ExponentialBackoff,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            initial_delay_ms: DEFAULT_INITIAL_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

/// Shape of the wait sequence between calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RetryStrategy {
    /// Call again without waiting
    None,

    /// Wait `initial-delay-ms` every time
    FixedDelay,

    /// `initial-delay-ms` times `backoff-multiplier` to the power of the
    /// retry number
    #[default]
    ExponentialBackoff,

    /// `initial-delay-ms` times the retry number
    LinearBackoff,
}
