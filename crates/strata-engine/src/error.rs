//! Driver error types

use strata_core::StrataError;
use thiserror::Error;

/// Failure inside a database driver
#[derive(Error, Debug)]
pub enum DriverError {
    /// Could not open or configure a connection
    #[error("Connection error: {0}")]
    Connection(String),

    /// A value could not be bound to a statement parameter
    #[error("Parameter error: {0}")]
    Parameter(String),

    /// The blocking task running a statement panicked or was cancelled
    #[error("Driver task failed: {0}")]
    Task(String),

    /// No driver is compiled in for the dialect
    #[error("No driver available for dialect `{0}`")]
    UnsupportedDialect(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[cfg(feature = "postgres")]
    #[error("Postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[cfg(feature = "mysql")]
    #[error("MySQL error: {0}")]
    Mysql(#[from] mysql_async::Error),

    #[cfg(feature = "mssql")]
    #[error("SQL Server error: {0}")]
    Mssql(#[from] tiberius::error::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for driver operations
pub type DriverResult<T> = Result<T, DriverError>;

impl DriverError {
    /// Convert into the engine taxonomy, tagged with a document number
    pub fn into_strata(self, document: usize) -> StrataError {
        match self {
            Self::UnsupportedDialect(dialect) => {
                StrataError::NotImplemented(format!("driver for dialect `{}`", dialect))
            }
            Self::Connection(message) => StrataError::ConnectionUnavailable(message),
            other => StrataError::db(document, other),
        }
    }
}
