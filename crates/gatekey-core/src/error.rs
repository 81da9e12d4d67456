//! Error types for gatekey-core

use thiserror::Error;

/// Result type alias using gatekey-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for Gatekey
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml_ng::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Access key could not be decoded
    #[error("Invalid access key: {reason}")]
    InvalidAccessKey { reason: String },

    /// Key hash had the wrong size
    #[error("Invalid key hash length: expected 32 bytes, got {len}")]
    InvalidKeyHash { len: usize },
}

impl Error {
    /// Create a config not found error
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    /// Create an invalid config error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create an invalid access key error
    pub fn invalid_access_key(reason: impl Into<String>) -> Self {
        Self::InvalidAccessKey {
            reason: reason.into(),
        }
    }
}
