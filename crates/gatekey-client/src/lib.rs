//! # gatekey-client
//!
//! Gateway-side access to the Gatekey auth service:
//! - [`AuthClient`] resolves access key IDs and checks bucket names over
//!   HTTP with bounded retry
//! - [`ResolveCache`] fronts it with an expiring, encrypting, single-flight
//!   cache
//! - [`SecureString`] keeps resolved secrets out of logs and memory dumps

pub mod cache;
pub mod client;
mod encryption;
pub mod security;
pub mod types;

pub use cache::{CacheStats, ResolveCache};
pub use client::{AuthClient, REQUEST_ID_HEADER};
pub use security::SecureString;
pub use tokio_util::sync::CancellationToken;
pub use types::{
    AuthServiceError, AuthServiceResponse, BucketIsUniqueResponse, Result, STATUS_CLIENT_CLOSED_REQUEST,
};
