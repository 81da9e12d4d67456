//! Fixtures for auth client tests

use gatekey_client::AuthClient;
use gatekey_core::types::{CacheConfig, ClientConfig, RetryPolicy, RetryStrategy};
use gatekey_core::EncryptionKey;
use serde_json::json;
use tracing_subscriber::EnvFilter;
use wiremock::MockServer;

pub const TEST_TOKEN: &str = "test-token";
pub const CLIENT_IP: &str = "203.0.113.7";
pub const ACCESS_GRANT: &str = "1AccessGrantPlaintextForTests";
pub const SECRET_KEY: &str = "SecretKeyPlaintextForTests";

/// Route client logs to the test harness; safe to call from every test
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A fresh, well-formed access key ID
pub fn access_key_id() -> String {
    EncryptionKey::generate().to_base32()
}

/// Fixed short delays so retry tests stay fast
pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        strategy: RetryStrategy::FixedDelay,
        backoff_multiplier: 1.0,
        initial_delay_ms: 5,
        max_delay_ms: 5,
    }
}

/// Body the auth service returns for a resolved key
pub fn grant_body(public: bool) -> serde_json::Value {
    json!({
        "access_grant": ACCESS_GRANT,
        "secret_key": SECRET_KEY,
        "public": public,
    })
}

pub fn client_config(base_url: &str, retry: RetryPolicy) -> ClientConfig {
    ClientConfig {
        base_url: base_url.to_string(),
        token: TEST_TOKEN.to_string(),
        timeout_secs: 5,
        retry,
    }
}

/// Client pointed at `server` with caching switched on or off
pub fn client_for(server: &MockServer, retry: RetryPolicy, cache_enabled: bool) -> AuthClient {
    init_tracing();
    let cache = CacheConfig {
        enabled: cache_enabled,
        capacity: 64,
        ttl_secs: 60,
    };
    AuthClient::new(&client_config(&server.uri(), retry), &cache).expect("client should build")
}
