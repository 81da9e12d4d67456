//! Common test helpers for gatekey-client integration tests
//!
//! - Fixture builders for clients, policies and access keys
//! - wiremock helpers standing in for the auth service

pub mod fixtures;
pub mod mock_server;

pub use fixtures::*;
pub use mock_server::*;
