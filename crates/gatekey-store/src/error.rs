//! Storage error taxonomy
//!
//! Every failure leaving the store is an [`Error`] carrying an [`ErrorCode`]
//! from a closed set, so callers branch on codes instead of driver text.

use std::fmt;
use std::sync::Arc;

/// Result type alias using gatekey-store's Error type
pub type Result<T> = std::result::Result<T, Error>;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Kinds of storage failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Unknown,
    UnsupportedDriver,
    NoRows,
    TransactionAlreadyDone,
    TooManyRows,
    ConstraintViolation,
    EmptyUpdate,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::Unknown => "unknown",
            ErrorCode::UnsupportedDriver => "unsupported driver",
            ErrorCode::NoRows => "no rows",
            ErrorCode::TransactionAlreadyDone => "transaction already done",
            ErrorCode::TooManyRows => "too many rows",
            ErrorCode::ConstraintViolation => "constraint violation",
            ErrorCode::EmptyUpdate => "empty update",
        };
        f.write_str(name)
    }
}

/// A classified storage error
#[derive(Debug, thiserror::Error)]
pub struct Error {
    code: ErrorCode,
    driver: Option<String>,
    constraint: Option<String>,
    query_suffix: Option<String>,
    context: Option<String>,
    #[source]
    source: Option<BoxError>,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(context) = &self.context {
            write!(f, "{}: ", context)?;
        }
        match self.code {
            ErrorCode::UnsupportedDriver => write!(
                f,
                "unsupported driver {:?}",
                self.driver.as_deref().unwrap_or_default()
            )?,
            ErrorCode::ConstraintViolation => write!(
                f,
                "constraint violation {:?}",
                self.constraint.as_deref().unwrap_or_default()
            )?,
            ErrorCode::TooManyRows => write!(
                f,
                "too many rows for {}",
                self.query_suffix.as_deref().unwrap_or("query")
            )?,
            code => write!(f, "{}", code)?,
        }
        if let Some(source) = &self.source {
            write!(f, ": {}", source)?;
        }
        Ok(())
    }
}

impl Error {
    fn with_code(code: ErrorCode) -> Self {
        Self {
            code,
            driver: None,
            constraint: None,
            query_suffix: None,
            context: None,
            source: None,
        }
    }

    /// Any driver error that is not a recognized constraint violation
    pub fn unknown(source: impl Into<BoxError>) -> Self {
        Self {
            source: Some(source.into()),
            ..Self::with_code(ErrorCode::Unknown)
        }
    }

    /// The configured driver name has no dialect
    pub fn unsupported_driver(driver: impl Into<String>) -> Self {
        Self {
            driver: Some(driver.into()),
            ..Self::with_code(ErrorCode::UnsupportedDriver)
        }
    }

    /// A single-row read found nothing
    pub fn no_rows() -> Self {
        Self::with_code(ErrorCode::NoRows)
    }

    /// A finished transaction was used again
    pub fn transaction_already_done() -> Self {
        Self::with_code(ErrorCode::TransactionAlreadyDone)
    }

    /// A single-row read matched more than one row
    pub fn too_many_rows(query_suffix: impl Into<String>) -> Self {
        Self {
            query_suffix: Some(query_suffix.into()),
            ..Self::with_code(ErrorCode::TooManyRows)
        }
    }

    /// The backend rejected a write on an integrity constraint
    pub fn constraint_violation(constraint: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            constraint: Some(constraint.into()),
            source: Some(source.into()),
            ..Self::with_code(ErrorCode::ConstraintViolation)
        }
    }

    /// An update supplied no fields
    pub fn empty_update() -> Self {
        Self::with_code(ErrorCode::EmptyUpdate)
    }

    /// Prefix the message with `context`, keeping every structured field
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(match self.context.take() {
            Some(inner) => format!("{}: {}", context.into(), inner),
            None => context.into(),
        });
        self
    }

    /// The error kind
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Driver name, for `UnsupportedDriver`
    pub fn driver(&self) -> Option<&str> {
        self.driver.as_deref()
    }

    /// Backend-reported constraint name, for `ConstraintViolation`
    ///
    /// May be empty when the backend's message could not be parsed.
    pub fn constraint(&self) -> Option<&str> {
        self.constraint.as_deref()
    }

    /// Operation that matched too many rows, for `TooManyRows`
    pub fn query_suffix(&self) -> Option<&str> {
        self.query_suffix.as_deref()
    }

    /// Whether this is a constraint violation
    pub fn is_constraint_violation(&self) -> bool {
        self.code == ErrorCode::ConstraintViolation
    }
}

/// Final transformation applied to every error the store returns
///
/// Use [`Error::with_context`] inside a hook to annotate errors without
/// losing their code or constraint name.
pub type ErrorHook = Arc<dyn Fn(Error) -> Error + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_constraint_violation_fields() {
        let err = Error::constraint_violation("records_pkey", io::Error::other("duplicate key"));

        assert_eq!(err.code(), ErrorCode::ConstraintViolation);
        assert!(err.is_constraint_violation());
        assert_eq!(err.constraint(), Some("records_pkey"));
        assert_eq!(
            err.to_string(),
            "constraint violation \"records_pkey\": duplicate key"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_unsupported_driver_display() {
        let err = Error::unsupported_driver("mysql");
        assert_eq!(err.driver(), Some("mysql"));
        assert_eq!(err.to_string(), "unsupported driver \"mysql\"");
    }

    #[test]
    fn test_context_keeps_structure() {
        let err = Error::too_many_rows("find_by_key_hash")
            .with_context("lookup")
            .with_context("gateway");

        assert_eq!(err.code(), ErrorCode::TooManyRows);
        assert_eq!(err.query_suffix(), Some("find_by_key_hash"));
        assert_eq!(
            err.to_string(),
            "gateway: lookup: too many rows for find_by_key_hash"
        );
    }

    #[test]
    fn test_plain_codes_display() {
        assert_eq!(Error::empty_update().to_string(), "empty update");
        assert_eq!(
            Error::transaction_already_done().to_string(),
            "transaction already done"
        );
        assert_eq!(Error::no_rows().to_string(), "no rows");
    }
}
