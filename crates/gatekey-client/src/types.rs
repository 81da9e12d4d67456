//! Auth service response and error types

use serde::Deserialize;

use crate::security::SecureString;

/// Nonstandard status used when the caller gave up on the request
pub const STATUS_CLIENT_CLOSED_REQUEST: u16 = 499;

/// Result type alias for auth service calls
pub type Result<T> = std::result::Result<T, AuthServiceError>;

/// Credentials the auth service resolved an access key to
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthServiceResponse {
    /// Serialized access grant
    pub access_grant: SecureString,

    /// S3 secret key paired with the access key ID
    pub secret_key: SecureString,

    /// Whether the access allows unauthenticated (public) use
    pub public: bool,
}

/// Answer to a bucket name uniqueness check
///
/// Both fields are omitted by the auth service when empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BucketIsUniqueResponse {
    /// Why the name is unavailable, e.g. the bucket already exists
    #[serde(default)]
    pub error: String,

    #[serde(default)]
    pub is_available: bool,
}

/// A failed auth service call and the HTTP status it maps to
///
/// `Clone` so every caller sharing one upstream resolution receives the same
/// error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("auth service: {message} (status {status})")]
pub struct AuthServiceError {
    pub status: u16,
    pub message: String,
}

impl AuthServiceError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(400, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(500, message)
    }

    pub fn client_closed_request(message: impl Into<String>) -> Self {
        Self::new(STATUS_CLIENT_CLOSED_REQUEST, message)
    }

    /// 4xx, including 499
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    /// 5xx
    pub fn is_server_error(&self) -> bool {
        self.status >= 500
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_decodes_and_redacts() {
        let body = r#"{"access_grant":"1Grant","secret_key":"sk","public":true}"#;
        let response: AuthServiceResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.access_grant.as_str(), "1Grant");
        assert_eq!(response.secret_key.as_str(), "sk");
        assert!(response.public);

        let debug = format!("{:?}", response);
        assert!(!debug.contains("1Grant"));
    }

    #[test]
    fn test_bucket_response_defaults_omitted_fields() {
        let taken: BucketIsUniqueResponse =
            serde_json::from_str(r#"{"error":"bucket already exists"}"#).unwrap();
        assert!(!taken.is_available);
        assert_eq!(taken.error, "bucket already exists");

        let free: BucketIsUniqueResponse = serde_json::from_str(r#"{"is_available":true}"#).unwrap();
        assert!(free.is_available);
        assert!(free.error.is_empty());
    }

    #[test]
    fn test_error_classes() {
        assert!(AuthServiceError::bad_request("bad").is_client_error());
        assert!(AuthServiceError::client_closed_request("gone").is_client_error());
        assert!(AuthServiceError::internal("boom").is_server_error());
        assert!(AuthServiceError::new(404, "404 Not Found").is_not_found());
        assert!(!AuthServiceError::new(503, "x").is_client_error());
    }

    #[test]
    fn test_display() {
        let err = AuthServiceError::new(404, "404 Not Found");
        assert_eq!(err.to_string(), "auth service: 404 Not Found (status 404)");
    }
}
