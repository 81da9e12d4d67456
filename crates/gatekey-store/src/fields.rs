//! Per-column field wrappers
//!
//! A wrapper is unset, explicitly null (nullable columns only), or holds a
//! value. Partial INSERT and UPDATE statements are built from the wrappers
//! a caller actually set, so "no opinion" and "set to NULL" stay distinct.

use chrono::{DateTime, Utc};
use sea_orm::Value;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
enum FieldState<T> {
    #[default]
    Unset,
    Null,
    Value(T),
}

impl<T> FieldState<T> {
    fn is_set(&self) -> bool {
        !matches!(self, FieldState::Unset)
    }

    fn get(&self) -> Option<&T> {
        match self {
            FieldState::Value(v) => Some(v),
            _ => None,
        }
    }
}

macro_rules! field {
    (@common $(#[$meta:meta])* $name:ident, $column:literal, $ty:ty) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Default)]
        pub struct $name(FieldState<$ty>);

        impl $name {
            /// Column this field writes
            pub const COLUMN: &'static str = $column;

            /// Field holding `v`
            pub fn new(v: impl Into<$ty>) -> Self {
                Self(FieldState::Value(v.into()))
            }

            /// Whether the caller supplied this field, null included
            pub fn is_set(&self) -> bool {
                self.0.is_set()
            }

            /// The held value, if any
            pub fn get(&self) -> Option<&$ty> {
                self.0.get()
            }

            /// Value to bind. Unset and null fields both bind SQL NULL.
            pub fn value(&self) -> Value {
                self.0.get().cloned().into()
            }
        }
    };

    ($(#[$meta:meta])* nullable $name:ident, $column:literal, $ty:ty) => {
        field!(@common $(#[$meta])* $name, $column, $ty);

        impl $name {
            /// Field explicitly set to NULL
            pub fn null() -> Self {
                Self(FieldState::Null)
            }

            /// Field from a native optional: `None` becomes an explicit NULL
            pub fn raw(v: Option<$ty>) -> Self {
                match v {
                    Some(v) => Self::new(v),
                    None => Self::null(),
                }
            }

            /// Whether the field was explicitly set to NULL
            pub fn is_null(&self) -> bool {
                matches!(self.0, FieldState::Null)
            }
        }
    };

    ($(#[$meta:meta])* $name:ident, $column:literal, $ty:ty) => {
        field!(@common $(#[$meta])* $name, $column, $ty);
    };
}

field!(
    /// `records.encryption_key_hash`
    RecordEncryptionKeyHash, "encryption_key_hash", Vec<u8>
);
field!(
    /// `records.created_at`
    RecordCreatedAt, "created_at", DateTime<Utc>
);
field!(
    /// `records.public`
    RecordPublic, "public", bool
);
field!(
    /// `records.satellite_address`
    RecordSatelliteAddress, "satellite_address", String
);
field!(
    /// `records.macaroon_head`
    RecordMacaroonHead, "macaroon_head", Vec<u8>
);
field!(
    /// `records.expires_at`
    nullable RecordExpiresAt, "expires_at", DateTime<Utc>
);
field!(
    /// `records.encrypted_secret_key`
    RecordEncryptedSecretKey, "encrypted_secret_key", Vec<u8>
);
field!(
    /// `records.encrypted_access_grant`
    RecordEncryptedAccessGrant, "encrypted_access_grant", Vec<u8>
);
field!(
    /// `records.invalid_reason`
    nullable RecordInvalidReason, "invalid_reason", String
);
field!(
    /// `records.invalid_at`
    nullable RecordInvalidAt, "invalid_at", DateTime<Utc>
);

/// Optional columns accepted at creation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordCreateFields {
    pub expires_at: RecordExpiresAt,
    pub invalid_reason: RecordInvalidReason,
    pub invalid_at: RecordInvalidAt,
}

/// Columns an invalidation may change
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordUpdateFields {
    pub invalid_reason: RecordInvalidReason,
    pub invalid_at: RecordInvalidAt,
}

impl RecordUpdateFields {
    /// Whether no column would change
    pub fn is_empty(&self) -> bool {
        !self.invalid_reason.is_set() && !self.invalid_at.is_set()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_unset_and_null_bind_no_value() {
        let unset = RecordInvalidReason::default();
        let null = RecordInvalidReason::null();

        assert!(!unset.is_set());
        assert!(null.is_set());
        assert!(null.is_null());
        assert_eq!(unset.value(), Value::String(None));
        assert_eq!(null.value(), Value::String(None));
        assert_eq!(unset.get(), None);
    }

    #[test]
    fn test_value_binds_exactly_the_value() {
        let reason = RecordInvalidReason::new("revoked");
        assert!(reason.is_set());
        assert!(!reason.is_null());
        assert_eq!(reason.get().map(String::as_str), Some("revoked"));
        assert_eq!(reason.value(), Value::from("revoked".to_string()));

        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(RecordInvalidAt::new(at).value(), Value::from(at));
        assert_eq!(RecordPublic::new(true).value(), Value::from(true));
    }

    #[test]
    fn test_raw_maps_native_optionals() {
        assert!(RecordExpiresAt::raw(None).is_null());

        let at = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let field = RecordExpiresAt::raw(Some(at));
        assert!(!field.is_null());
        assert_eq!(field.get(), Some(&at));
    }

    #[test]
    fn test_update_fields_emptiness() {
        assert!(RecordUpdateFields::default().is_empty());

        let nulling = RecordUpdateFields {
            invalid_reason: RecordInvalidReason::null(),
            ..Default::default()
        };
        assert!(!nulling.is_empty());
    }

    #[test]
    fn test_column_names() {
        assert_eq!(RecordEncryptionKeyHash::COLUMN, "encryption_key_hash");
        assert_eq!(RecordInvalidAt::COLUMN, "invalid_at");
    }
}
