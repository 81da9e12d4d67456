//! Configuration types for Gatekey

mod gatekey_config;
mod retry_policy;

pub use gatekey_config::*;
pub use retry_policy::*;
