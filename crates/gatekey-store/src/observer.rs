//! Statement observation
//!
//! The store reports every statement it is about to run, and every rollback
//! failure it swallows, to a [`StatementObserver`] chosen at construction.

use sea_orm::Value;
use std::fmt::Write as _;

/// Receives store activity
pub trait StatementObserver: Send + Sync {
    /// A statement is about to execute
    fn on_statement(&self, operation: &str, sql: &str, args: &[Value]);

    /// A best-effort rollback failed; the original error is returned instead
    fn on_rollback_failed(&self, operation: &str, error: &dyn std::error::Error) {
        let _ = (operation, error);
    }
}

/// Ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpStatementObserver;

impl StatementObserver for NoOpStatementObserver {
    fn on_statement(&self, _operation: &str, _sql: &str, _args: &[Value]) {}
}

/// Logs statements at DEBUG and rollback failures at WARN
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingStatementObserver;

impl StatementObserver for TracingStatementObserver {
    fn on_statement(&self, operation: &str, sql: &str, args: &[Value]) {
        tracing::debug!(
            operation,
            sql,
            args = %describe_args(args),
            "executing statement"
        );
    }

    fn on_rollback_failed(&self, operation: &str, error: &dyn std::error::Error) {
        tracing::warn!(operation, error = %error, "rollback failed");
    }
}

/// Render bound arguments for logs
///
/// Byte arguments are shown by length only so ciphertext and key hashes stay
/// out of log files.
pub fn describe_args(args: &[Value]) -> String {
    let mut out = String::from("[");
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = match arg {
            Value::Bool(Some(v)) => write!(out, "{}", v),
            Value::String(Some(v)) => write!(out, "{:?}", v.as_str()),
            Value::Bytes(Some(v)) => write!(out, "<{} bytes>", v.len()),
            Value::ChronoDateTimeUtc(Some(v)) => write!(out, "{}", v.to_rfc3339()),
            Value::Bool(None)
            | Value::String(None)
            | Value::Bytes(None)
            | Value::ChronoDateTimeUtc(None) => write!(out, "NULL"),
            other => write!(out, "{:?}", other),
        };
    }
    out.push(']');
    out
}
