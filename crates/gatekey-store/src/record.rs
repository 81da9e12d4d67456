//! The credential record

use chrono::{DateTime, Utc};
use gatekey_core::KeyHash;
use sea_orm::{DbErr, QueryResult};

/// Every column of `records`, in schema order
pub(crate) const RECORD_COLUMNS: [&str; 10] = [
    "encryption_key_hash",
    "created_at",
    "public",
    "satellite_address",
    "macaroon_head",
    "expires_at",
    "encrypted_secret_key",
    "encrypted_access_grant",
    "invalid_reason",
    "invalid_at",
];

/// A persisted mapping from a key hash to its encrypted credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub encryption_key_hash: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub public: bool,
    pub satellite_address: String,
    pub macaroon_head: Vec<u8>,
    pub expires_at: Option<DateTime<Utc>>,
    pub encrypted_secret_key: Vec<u8>,
    pub encrypted_access_grant: Vec<u8>,
    pub invalid_reason: Option<String>,
    pub invalid_at: Option<DateTime<Utc>>,
}

impl Record {
    /// Whether the record has been invalidated
    pub fn is_invalid(&self) -> bool {
        self.invalid_reason.is_some()
    }

    /// Whether the record had expired at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    /// The primary key as a typed hash
    pub fn key_hash(&self) -> gatekey_core::Result<KeyHash> {
        KeyHash::from_slice(&self.encryption_key_hash)
    }

    pub(crate) fn from_row(row: &QueryResult) -> Result<Self, DbErr> {
        Ok(Self {
            encryption_key_hash: row.try_get("", "encryption_key_hash")?,
            created_at: row.try_get("", "created_at")?,
            public: row.try_get("", "public")?,
            satellite_address: row.try_get("", "satellite_address")?,
            macaroon_head: row.try_get("", "macaroon_head")?,
            expires_at: row.try_get("", "expires_at")?,
            encrypted_secret_key: row.try_get("", "encrypted_secret_key")?,
            encrypted_access_grant: row.try_get("", "encrypted_access_grant")?,
            invalid_reason: row.try_get("", "invalid_reason")?,
            invalid_at: row.try_get("", "invalid_at")?,
        })
    }
}

/// Columns a caller must supply to create a record
///
/// `created_at` is absent on purpose: the store always assigns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    pub key_hash: KeyHash,
    pub public: bool,
    pub satellite_address: String,
    pub macaroon_head: Vec<u8>,
    pub encrypted_secret_key: Vec<u8>,
    pub encrypted_access_grant: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record() -> Record {
        Record {
            encryption_key_hash: vec![0u8; 32],
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            public: false,
            satellite_address: "1SatelliteId@sat.example.test:7777".to_string(),
            macaroon_head: vec![1, 2, 3],
            expires_at: None,
            encrypted_secret_key: vec![4],
            encrypted_access_grant: vec![5],
            invalid_reason: None,
            invalid_at: None,
        }
    }

    #[test]
    fn test_expiry() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut record = record();
        assert!(!record.is_expired_at(now));

        record.expires_at = Some(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());
        assert!(record.is_expired_at(now));

        record.expires_at = Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
        assert!(!record.is_expired_at(now));
    }

    #[test]
    fn test_key_hash() {
        let mut record = record();
        assert!(record.key_hash().is_ok());

        record.encryption_key_hash.truncate(8);
        assert!(record.key_hash().is_err());
    }
}
