//! Gatekey configuration types
//!
//! Every tunable of the store, the resolution client, its cache, and inbound
//! authentication is enumerated here. Nothing is read from ambient globals.

use super::RetryPolicy;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use url::Url;

/// Complete Gatekey configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GatekeyConfig {
    /// Record store backend
    #[serde(default)]
    pub store: StoreConfig,

    /// Resolution client settings
    #[serde(default)]
    pub client: ClientConfig,

    /// Resolution cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Inbound bearer authentication
    #[serde(default)]
    pub auth: AuthConfig,
}

impl GatekeyConfig {
    /// Reject settings that would make a component unusable
    pub fn validate(&self) -> Result<()> {
        if self.store.driver.trim().is_empty() {
            return Err(Error::invalid_config("store.driver must not be empty"));
        }
        if self.store.max_connections == 0 {
            return Err(Error::invalid_config(
                "store.max-connections must be at least 1",
            ));
        }
        if self.client.retry.max_attempts == 0 {
            return Err(Error::invalid_config(
                "client.retry.max-attempts must be at least 1",
            ));
        }
        if self.client.timeout_secs == 0 {
            return Err(Error::invalid_config("client.timeout-secs must be positive"));
        }
        if self.cache.enabled && self.cache.capacity == 0 {
            return Err(Error::invalid_config(
                "cache.capacity must be positive when the cache is enabled",
            ));
        }
        Url::parse(&self.client.base_url).map_err(|e| {
            Error::invalid_config(format!(
                "client.base-url {:?} is not a valid URL: {}",
                self.client.base_url, e
            ))
        })?;
        Ok(())
    }
}

/// Record store backend selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StoreConfig {
    /// Dialect name: sqlite3, postgres, pgx, cockroach, or pgxcockroach
    #[serde(default = "default_driver")]
    pub driver: String,

    /// Driver-specific connection string
    #[serde(default = "default_connection_string")]
    pub connection_string: String,

    /// Upper bound on pooled connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            driver: default_driver(),
            connection_string: default_connection_string(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_driver() -> String {
    "sqlite3".to_string()
}
fn default_connection_string() -> String {
    "sqlite::memory:".to_string()
}
fn default_max_connections() -> u32 {
    10
}

/// Resolution client settings
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClientConfig {
    /// Base URL of the auth service
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token presented to the auth service
    #[serde(default)]
    pub token: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Backoff applied to transient failures
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: String::new(),
            timeout_secs: default_timeout_secs(),
            retry: RetryPolicy::default(),
        }
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .field("timeout_secs", &self.timeout_secs)
            .field("retry", &self.retry)
            .finish()
    }
}

fn default_base_url() -> String {
    "http://localhost:20000".to_string()
}
fn default_timeout_secs() -> u64 {
    10
}

/// Resolution cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CacheConfig {
    /// Whether resolutions are cached at all
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,

    /// Maximum number of cached access keys
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,

    /// Time-to-live of a cached entry in seconds
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            capacity: default_cache_capacity(),
            ttl_secs: default_cache_ttl(),
        }
    }
}

fn default_cache_enabled() -> bool {
    true
}
fn default_cache_capacity() -> usize {
    10_000
}
fn default_cache_ttl() -> u64 {
    300 // 5 minutes
}

/// Bearer tokens accepted from inbound callers
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AuthConfig {
    /// Accepted tokens. An empty list accepts every request.
    #[serde(default)]
    pub tokens: Vec<String>,
}

impl AuthConfig {
    /// Check an `Authorization` header value against the accepted tokens
    ///
    /// Each comparison runs in constant time.
    pub fn authorizes(&self, authorization: Option<&str>) -> bool {
        if self.tokens.is_empty() {
            return true;
        }

        let presented = authorization.unwrap_or_default().as_bytes();
        let mut authorized = false;
        for token in &self.tokens {
            let expected = format!("Bearer {}", token);
            authorized |= bool::from(presented.ct_eq(expected.as_bytes()));
        }
        authorized
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("tokens", &format_args!("[{} REDACTED]", self.tokens.len()))
            .finish()
    }
}
