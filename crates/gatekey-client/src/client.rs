//! Auth service resolution client
//!
//! Resolves access key IDs into credentials and checks bucket names over
//! HTTP. Transport failures, undecodable bodies and HTTP 500 are retried
//! under the configured backoff policy; any other non-200 status is returned
//! at once with its status preserved.

use std::time::Duration;

use gatekey_core::retry::{
    HttpStatusError, HttpStatusPredicate, RetryError, RetryExecutorBuilder, TracingObserver,
};
use gatekey_core::types::{CacheConfig, ClientConfig, RetryPolicy};
use gatekey_core::{EncryptionKey, GatekeyConfig};
use reqwest::header::FORWARDED;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

use crate::cache::{CacheStats, ResolveCache};
use crate::security::SecureString;
use crate::types::{AuthServiceError, AuthServiceResponse, BucketIsUniqueResponse, Result};

/// Header carrying the per-request correlation ID
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Status the auth service uses for unexpected, retry-worthy failures
const RETRYABLE_STATUS: u16 = 500;

/// Why a single HTTP attempt failed
#[derive(Debug, thiserror::Error)]
enum AttemptError {
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("{0}")]
    Status(StatusCode),

    #[error("response could not be decoded: {0}")]
    Decode(#[source] reqwest::Error),
}

impl HttpStatusError for AttemptError {
    fn status_code(&self) -> Option<u16> {
        match self {
            AttemptError::Status(status) => Some(status.as_u16()),
            AttemptError::Transport(_) | AttemptError::Decode(_) => None,
        }
    }
}

fn cancelled() -> AuthServiceError {
    AuthServiceError::client_closed_request("request cancelled")
}

fn validate_access_key_id(access_key_id: &str) -> Result<()> {
    if access_key_id.is_empty() {
        return Err(AuthServiceError::bad_request("Access Key ID is empty"));
    }
    EncryptionKey::from_base32(access_key_id).map_err(|err| {
        AuthServiceError::bad_request(format!("Access Key ID is invalid: {}", err))
    })?;
    Ok(())
}

/// Client for the auth service
pub struct AuthClient {
    http: reqwest::Client,
    base_url: Url,
    token: SecureString,
    retry: RetryPolicy,
    cache: Option<ResolveCache>,
}

impl std::fmt::Debug for AuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthClient")
            .field("base_url", &self.base_url.as_str())
            .field("token", &self.token)
            .field("retry", &self.retry)
            .field("cache", &self.cache)
            .finish()
    }
}

impl AuthClient {
    /// Build a client. The cache is created only when enabled.
    pub fn new(config: &ClientConfig, cache: &CacheConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|err| {
            AuthServiceError::internal(format!("invalid auth service URL {:?}: {}", config.base_url, err))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(AuthServiceError::internal(format!(
                "auth service URL {:?} cannot be a base",
                config.base_url
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| AuthServiceError::internal(format!("failed to build HTTP client: {}", err)))?;

        Ok(Self {
            http,
            base_url,
            token: SecureString::from(config.token.as_str()),
            retry: config.retry.clone(),
            cache: ResolveCache::from_config(cache),
        })
    }

    pub fn from_config(config: &GatekeyConfig) -> Result<Self> {
        Self::new(&config.client, &config.cache)
    }

    /// Cache counters, or `None` when caching is disabled
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(ResolveCache::stats)
    }

    fn access_url(&self, access_key_id: &str) -> Url {
        let mut url = self.base_url.clone();
        // cannot_be_a_base was rejected in new()
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["v1", "access", access_key_id]);
        }
        url
    }

    fn bucket_url(&self, bucket: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["v1", "bucket"]);
        }
        url.query_pairs_mut().append_pair("bucket", bucket);
        url
    }

    /// Resolve an access key ID into credentials
    ///
    /// `client_ip` is forwarded to the auth service. Cancelling `cancel`
    /// aborts the call, including any backoff wait, with status 499.
    pub async fn resolve(
        &self,
        access_key_id: &str,
        client_ip: &str,
        cancel: &CancellationToken,
    ) -> Result<AuthServiceResponse> {
        validate_access_key_id(access_key_id)?;
        self.get_with_retry(self.access_url(access_key_id), client_ip, cancel, "resolve access key")
            .await
    }

    /// Ask the auth service whether `bucket` is still unclaimed
    ///
    /// Retried and cancelled the same way as [`AuthClient::resolve`]. An
    /// empty bucket name is rejected with 400 before any request is sent.
    pub async fn check_bucket_is_unique(
        &self,
        bucket: &str,
        client_ip: &str,
        cancel: &CancellationToken,
    ) -> Result<BucketIsUniqueResponse> {
        if bucket.is_empty() {
            return Err(AuthServiceError::bad_request("Bucket name is empty"));
        }
        self.get_with_retry(self.bucket_url(bucket), client_ip, cancel, "check bucket")
            .await
    }

    /// GET `url` under the retry policy, decoding a 200 body as `T`
    async fn get_with_retry<T: DeserializeOwned>(
        &self,
        url: Url,
        client_ip: &str,
        cancel: &CancellationToken,
        operation: &'static str,
    ) -> Result<T> {
        let request_id = Uuid::new_v4().to_string();
        tracing::debug!(request_id = %request_id, client_ip, operation, "calling auth service");

        let executor = RetryExecutorBuilder::new()
            .with_policy(self.retry.clone())
            .with_predicate(HttpStatusPredicate::with_codes(vec![RETRYABLE_STATUS]))
            .with_observer(TracingObserver::new(operation))
            .with_cancellation(cancel.clone())
            .build();
        let attempts = executor.execute(|| self.fetch::<T>(url.clone(), client_ip, &request_id));

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled()),
            result = attempts => result,
        };

        result.map_err(|err| match err {
            RetryError::NonRetryable(AttemptError::Status(status)) => {
                AuthServiceError::new(status.as_u16(), status.to_string())
            }
            RetryError::Cancelled { .. } => cancelled(),
            other => {
                tracing::warn!(request_id = %request_id, operation, error = %other, "auth service call failed");
                AuthServiceError::internal(other.to_string())
            }
        })
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        url: Url,
        client_ip: &str,
        request_id: &str,
    ) -> std::result::Result<T, AttemptError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(self.token.as_str())
            .header(FORWARDED, format!("for={}", client_ip))
            .header(REQUEST_ID_HEADER, request_id)
            .send()
            .await
            .map_err(AttemptError::Transport)?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(AttemptError::Status(status));
        }

        response.json().await.map_err(AttemptError::Decode)
    }

    /// Like [`AuthClient::resolve`], answered from the cache when possible
    ///
    /// Malformed access key IDs are rejected before the cache is consulted.
    /// Falls back to a plain resolve when caching is disabled.
    pub async fn resolve_with_cache(
        &self,
        access_key_id: &str,
        client_ip: &str,
        cancel: &CancellationToken,
    ) -> Result<AuthServiceResponse> {
        validate_access_key_id(access_key_id)?;

        match &self.cache {
            Some(cache) => {
                cache
                    .get_or_resolve(access_key_id, || {
                        self.resolve(access_key_id, client_ip, cancel)
                    })
                    .await
            }
            None => self.resolve(access_key_id, client_ip, cancel).await,
        }
    }

    /// Ask the auth service whether it is live. Not retried.
    pub async fn get_health_live(&self, cancel: &CancellationToken) -> Result<bool> {
        let url = self.base_url.join("/v1/health/live").map_err(|err| {
            AuthServiceError::bad_request(format!("invalid health URL: {}", err))
        })?;

        let request = self.http.get(url).bearer_auth(self.token.as_str()).send();
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled()),
            response = request => response,
        };
        let response = response
            .map_err(|err| AuthServiceError::internal(format!("health check failed: {}", err)))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(AuthServiceError::new(status.as_u16(), status.to_string()));
        }
        Ok(true)
    }
}
