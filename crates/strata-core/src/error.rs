//! Error taxonomy shared by the compiler, planner and engine

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Error type for translation and execution
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StrataError {
    /// Table, column or data source absent from the active schema
    #[error("Schema not found: {0}")]
    SchemaNotFound(String),

    /// A value matched the blocked keyword or pattern lists
    #[error("Suspicious input in `{key}`: {value}")]
    SuspiciousInput { key: String, value: String },

    /// Wrong shape or type for a clause
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// No join record between the two tables
    #[error("No join defined between `{parent}` and `{child}`")]
    JoinNotFound { parent: String, child: String },

    /// The pool could not hand out a connection in time, or the probe failed
    #[error("Connection unavailable: {0}")]
    ConnectionUnavailable(String),

    /// A statement exceeded the per-request ceiling
    #[error("Query timed out after {0:?}")]
    QueryTimeout(Duration),

    /// Driver failure, tagged with the 1-based outermost document number
    #[error("Database error in document {document}: {message}")]
    Db { document: usize, message: String },

    /// Security-rule or value-transform collaborator failure
    #[error("Rule `{source_name}` failed: {message}")]
    RuleFailure {
        source_name: String,
        message: String,
    },

    /// The request document could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Dialect capability not available
    #[error("Not implemented: {0}")]
    NotImplemented(String),
}

/// Result type for strata operations
pub type StrataResult<T> = Result<T, StrataError>;

/// Stable, serializable error category for response envelopes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SchemaNotFound,
    SuspiciousInput,
    InvalidArgument,
    JoinNotFound,
    ConnectionUnavailable,
    QueryTimeout,
    DbError,
    TransformOrSecurityRuleFailure,
    Parse,
    NotImplemented,
}

impl StrataError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SchemaNotFound(_) => ErrorKind::SchemaNotFound,
            Self::SuspiciousInput { .. } => ErrorKind::SuspiciousInput,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::JoinNotFound { .. } => ErrorKind::JoinNotFound,
            Self::ConnectionUnavailable(_) => ErrorKind::ConnectionUnavailable,
            Self::QueryTimeout(_) => ErrorKind::QueryTimeout,
            Self::Db { .. } => ErrorKind::DbError,
            Self::RuleFailure { .. } => ErrorKind::TransformOrSecurityRuleFailure,
            Self::Parse(_) => ErrorKind::Parse,
            Self::NotImplemented(_) => ErrorKind::NotImplemented,
        }
    }

    /// Errors raised before any SQL runs
    pub fn is_compile_time(&self) -> bool {
        matches!(
            self,
            Self::SchemaNotFound(_)
                | Self::SuspiciousInput { .. }
                | Self::InvalidArgument(_)
                | Self::JoinNotFound { .. }
                | Self::Parse(_)
        )
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn db(document: usize, message: impl ToString) -> Self {
        Self::Db {
            document,
            message: message.to_string(),
        }
    }

    /// Re-tag a database error with a different document number
    pub fn with_document(self, document: usize) -> Self {
        match self {
            Self::Db { message, .. } => Self::Db { document, message },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serializes_snake_case() {
        let err = StrataError::db(2, "duplicate key");
        assert_eq!(
            serde_json::to_value(err.kind()).unwrap(),
            serde_json::json!("db_error")
        );
        assert_eq!(err.to_string(), "Database error in document 2: duplicate key");
    }

    #[test]
    fn test_with_document_only_touches_db_errors() {
        let err = StrataError::db(3, "boom").with_document(1);
        assert_eq!(err, StrataError::db(1, "boom"));

        let err = StrataError::invalid("x").with_document(5);
        assert_eq!(err, StrataError::InvalidArgument("x".to_string()));
    }

    #[test]
    fn test_compile_time_classification() {
        assert!(StrataError::SchemaNotFound("users".into()).is_compile_time());
        assert!(!StrataError::QueryTimeout(Duration::from_secs(1)).is_compile_time());
    }
}
