//! Backend dialects
//!
//! A dialect supplies the pieces that differ between SQL backends: placeholder
//! syntax, DDL column types, and how integrity-constraint failures are
//! reported. The engine is written once against [`Dialect`].

use std::fmt;
use std::sync::Arc;

use sea_orm::{DbBackend, DbErr, RuntimeErr};

use crate::error::{Error, Result};
use crate::sqlbundle::{rebind_numbered, Rebind};

/// Backend-specific strategy used by the engine
pub trait Dialect: Rebind + fmt::Debug + Send + Sync {
    /// Canonical driver name
    fn name(&self) -> &'static str;

    /// Backend used to build statements
    fn backend(&self) -> DbBackend;

    /// DDL for the `records` table
    fn schema(&self) -> &'static str;

    /// Constraint name when `err` is an integrity-constraint violation
    ///
    /// `Some("")` means the violation was recognized but its name could not
    /// be recovered.
    fn classify_constraint(&self, err: &DbErr) -> Option<String>;
}

/// Look up the dialect for a configured driver name
pub fn dialect_for_driver(driver: &str) -> Result<Arc<dyn Dialect>> {
    match driver {
        "pgx" | "pgxcockroach" | "postgres" | "postgresql" | "cockroach" => Ok(Arc::new(Postgres)),
        "sqlite3" | "sqlite" => Ok(Arc::new(Sqlite3)),
        other => Err(Error::unsupported_driver(other)),
    }
}

/// PostgreSQL and CockroachDB
#[derive(Debug, Clone, Copy, Default)]
pub struct Postgres;

impl Rebind for Postgres {
    fn rebind(&self, sql: &str) -> String {
        rebind_numbered(sql)
    }
}

impl Dialect for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn backend(&self) -> DbBackend {
        DbBackend::Postgres
    }

    fn schema(&self) -> &'static str {
        "CREATE TABLE IF NOT EXISTS records (
	encryption_key_hash bytea NOT NULL,
	created_at timestamp with time zone NOT NULL,
	public boolean NOT NULL,
	satellite_address text NOT NULL,
	macaroon_head bytea NOT NULL,
	expires_at timestamp with time zone,
	encrypted_secret_key bytea NOT NULL,
	encrypted_access_grant bytea NOT NULL,
	invalid_reason text,
	invalid_at timestamp with time zone,
	PRIMARY KEY ( encryption_key_hash )
);"
    }

    fn classify_constraint(&self, err: &DbErr) -> Option<String> {
        let info = driver_error(err)?;
        postgres_constraint(info.code.as_deref(), info.constraint.as_deref())
    }
}

/// SQLite
#[derive(Debug, Clone, Copy, Default)]
pub struct Sqlite3;

impl Rebind for Sqlite3 {
    fn rebind(&self, sql: &str) -> String {
        sql.to_string()
    }
}

impl Dialect for Sqlite3 {
    fn name(&self) -> &'static str {
        "sqlite3"
    }

    fn backend(&self) -> DbBackend {
        DbBackend::Sqlite
    }

    fn schema(&self) -> &'static str {
        "CREATE TABLE IF NOT EXISTS records (
	encryption_key_hash BLOB NOT NULL,
	created_at TIMESTAMP NOT NULL,
	public INTEGER NOT NULL,
	satellite_address TEXT NOT NULL,
	macaroon_head BLOB NOT NULL,
	expires_at TIMESTAMP,
	encrypted_secret_key BLOB NOT NULL,
	encrypted_access_grant BLOB NOT NULL,
	invalid_reason TEXT,
	invalid_at TIMESTAMP,
	PRIMARY KEY ( encryption_key_hash )
);"
    }

    fn classify_constraint(&self, err: &DbErr) -> Option<String> {
        let info = driver_error(err)?;
        sqlite_constraint(info.code.as_deref(), info.integrity, &info.message)
    }
}

/// The parts of a database-reported error the dialects inspect
struct DriverError {
    code: Option<String>,
    constraint: Option<String>,
    message: String,
    integrity: bool,
}

fn driver_error(err: &DbErr) -> Option<DriverError> {
    let runtime = match err {
        DbErr::Exec(runtime) | DbErr::Query(runtime) | DbErr::Conn(runtime) => runtime,
        _ => return None,
    };
    let RuntimeErr::SqlxError(sqlx_err) = runtime else {
        return None;
    };
    let db_err = sqlx_err.as_database_error()?;

    Some(DriverError {
        code: db_err.code().map(|code| code.into_owned()),
        constraint: db_err.constraint().map(str::to_string),
        message: db_err.message().to_string(),
        integrity: db_err.is_unique_violation()
            || db_err.is_foreign_key_violation()
            || db_err.is_check_violation(),
    })
}

/// SQLSTATE class 23 is "integrity constraint violation"; the server names
/// the constraint directly
fn postgres_constraint(code: Option<&str>, constraint: Option<&str>) -> Option<String> {
    let code = code?;
    if !code.starts_with("23") {
        return None;
    }
    Some(constraint.unwrap_or_default().to_string())
}

const SQLITE_CONSTRAINT: i64 = 19;

/// SQLite reports SQLITE_CONSTRAINT (possibly extended) and embeds the
/// constraint in the message after the final colon, e.g.
/// `UNIQUE constraint failed: records.encryption_key_hash`
fn sqlite_constraint(code: Option<&str>, integrity: bool, message: &str) -> Option<String> {
    let primary_code = code
        .and_then(|code| code.parse::<i64>().ok())
        .map(|code| code & 0xff);
    if primary_code != Some(SQLITE_CONSTRAINT) && !integrity {
        return None;
    }

    let name = message
        .rfind(':')
        .map(|colon| message[colon + 1..].trim().to_string())
        .unwrap_or_default();
    Some(name)
}
