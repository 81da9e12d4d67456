//! # gatekey-core
//!
//! Core library for Gatekey providing:
//! - Configuration file parsing (gatekey.yaml) with environment overrides
//! - Access key and key hash types
//! - Retry execution engine with policy-based configuration

pub mod access_key;
pub mod config;
pub mod error;
pub mod retry;
pub mod types;

pub use access_key::{EncryptionKey, KeyHash};
pub use config::ConfigLoader;
pub use error::{Error, Result};
pub use types::GatekeyConfig;
