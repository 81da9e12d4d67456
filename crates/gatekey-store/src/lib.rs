//! # gatekey-store
//!
//! Transactional credential record store for Gatekey.
//!
//! - [`Db`], [`Tx`] and [`Rx`] run the same [`RecordStore`] operations on a
//!   pool, an explicit transaction, or a lazily opened one
//! - statements are composed with [`sqlbundle::Sql`] and rebound per
//!   [`Dialect`]
//! - driver failures are normalized into [`Error`] with an [`ErrorCode`]

pub mod db;
pub mod dialect;
pub mod error;
pub mod fields;
pub mod observer;
pub mod record;
pub mod sqlbundle;

pub use db::{Clock, Db, RecordStore, Rx, StoreOptions, Tx};
pub use dialect::{dialect_for_driver, Dialect, Postgres, Sqlite3};
pub use error::{Error, ErrorCode, ErrorHook, Result};
pub use fields::{
    RecordCreateFields, RecordCreatedAt, RecordEncryptedAccessGrant, RecordEncryptedSecretKey,
    RecordEncryptionKeyHash, RecordExpiresAt, RecordInvalidAt, RecordInvalidReason,
    RecordMacaroonHead, RecordPublic, RecordSatelliteAddress, RecordUpdateFields,
};
pub use observer::{NoOpStatementObserver, StatementObserver, TracingStatementObserver};
pub use record::{NewRecord, Record};
