//! Error types for Staffload.
//!
//! Library crates use [`StaffloadError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Row-level validation problems are *not* errors: they are collected on
//! [`ImportRow::errors`](crate::ImportRow::errors) and reported per row.

use std::path::PathBuf;

/// Top-level error type for all Staffload operations.
#[derive(Debug, thiserror::Error)]
pub enum StaffloadError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// The input stream could not be read as tabular data.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// A commit was rejected because one or more payroll numbers collide,
    /// either within the batch or with records already persisted.
    #[error("duplicate payroll number(s): {}", keys.join(", "))]
    DuplicateKey { keys: Vec<String> },

    /// A record with the given id does not exist.
    #[error("employee {0} not found")]
    NotFound(i64),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A record failed business validation outside of a CSV import.
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, StaffloadError>;

impl StaffloadError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a storage error from any displayable value.
    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }

    /// Create a duplicate-key error for a single payroll number.
    pub fn duplicate(key: impl Into<String>) -> Self {
        Self::DuplicateKey {
            keys: vec![key.into()],
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = StaffloadError::config("missing database path");
        assert_eq!(err.to_string(), "config error: missing database path");

        let err = StaffloadError::validation("Email is required");
        assert!(err.to_string().contains("Email is required"));
    }

    #[test]
    fn duplicate_key_names_every_key() {
        let err = StaffloadError::DuplicateKey {
            keys: vec!["COOP08".into(), "SMIT01".into()],
        };
        assert_eq!(
            err.to_string(),
            "duplicate payroll number(s): COOP08, SMIT01"
        );
    }
}
