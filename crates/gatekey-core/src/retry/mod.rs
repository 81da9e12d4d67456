//! Bounded retry with backoff
//!
//! Only callers of remote services retry. Storage operations never do; the
//! resolution client is the one user of this module.
//!
//! ```rust,no_run
//! use gatekey_core::retry::{RetryError, RetryExecutorBuilder, TracingObserver};
//! use gatekey_core::types::RetryPolicy;
//!
//! async fn example() -> Result<String, RetryError<std::io::Error>> {
//!     RetryExecutorBuilder::new()
//!         .with_policy(RetryPolicy::default())
//!         .with_observer(TracingObserver::new("resolve"))
//!         .build()
//!         .execute(|| async { Ok("resolved".to_string()) })
//!         .await
//! }
//! ```

mod error;
mod executor;
mod observer;
mod strategies;

pub use error::RetryError;
pub use executor::{RetryExecutor, RetryExecutorBuilder};
pub use observer::{NoOpObserver, RetryEvent, RetryObserver, StatsObserver, TracingObserver};
pub use strategies::{
    calculate_delay, AlwaysRetry, HttpStatusError, HttpStatusPredicate, RetryPredicate,
};
