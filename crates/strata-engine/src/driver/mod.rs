//! Database drivers.
//!
//! A [`Driver`] opens [`Connection`]s for one data source. Connections speak
//! in driver-neutral [`ResultSet`]s and bind `serde_json` values as
//! positional parameters; arrays and objects are bound as JSON text.

mod sqlite;
#[cfg(feature = "mssql")]
mod mssql;
#[cfg(feature = "mysql")]
mod mysql;
#[cfg(feature = "postgres")]
mod postgres;

pub use sqlite::{SqliteConnection, SqliteDriver};
#[cfg(feature = "mssql")]
pub use mssql::MsSqlDriver;
#[cfg(feature = "mysql")]
pub use mysql::MySqlDriver;
#[cfg(feature = "postgres")]
pub use postgres::PostgresDriver;

use crate::error::{DriverError, DriverResult};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;
use strata_core::ResultSet;

#[async_trait]
pub trait Driver: Send + Sync + Debug {
    /// Dialect identifier this driver serves
    fn dialect(&self) -> &'static str;

    async fn connect(&self) -> DriverResult<Box<dyn Connection>>;
}

#[async_trait]
pub trait Connection: Send {
    /// Run a statement and collect its rows
    async fn query(&mut self, sql: &str, params: &[Value]) -> DriverResult<ResultSet>;

    /// Run a statement that returns no rows
    async fn execute(&mut self, sql: &str, params: &[Value]) -> DriverResult<ResultSet>;

    /// Run parameterless statements (transaction control)
    async fn batch(&mut self, sql: &str) -> DriverResult<()>;
}

/// Driver for a configured dialect and URL
pub fn open_driver(dialect: &str, url: &str) -> DriverResult<Arc<dyn Driver>> {
    match dialect {
        "sqlite" => Ok(Arc::new(SqliteDriver::new(url))),
        #[cfg(feature = "postgres")]
        "postgres" => Ok(Arc::new(PostgresDriver::new(url))),
        #[cfg(feature = "mysql")]
        "mysql" => Ok(Arc::new(MySqlDriver::new(url))),
        #[cfg(feature = "mssql")]
        "mssql" => Ok(Arc::new(MsSqlDriver::new(url)?)),
        other => Err(DriverError::UnsupportedDialect(other.to_string())),
    }
}

/// Text form for values bound as strings
pub(crate) fn json_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Rewrite `?` markers to `@P1, @P2, ...`, leaving quoted text alone
#[cfg_attr(not(feature = "mssql"), allow(dead_code))]
pub(crate) fn number_markers(sql: &str, prefix: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut quote: Option<char> = None;
    let mut n = 0;
    for c in sql.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => {
                quote = None;
                out.push(c);
            }
            (Some(_), c) => out.push(c),
            (None, '\'' | '"' | '[') => {
                quote = Some(if c == '[' { ']' } else { c });
                out.push(c);
            }
            (None, '?') => {
                n += 1;
                out.push_str(prefix);
                out.push_str(&n.to_string());
            }
            (None, c) => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_markers_skip_quoted_text() {
        assert_eq!(
            number_markers("insert into t (a, b) values (?, '?') where [x?] = ?", "@P"),
            "insert into t (a, b) values (@P1, '?') where [x?] = @P2"
        );
    }

    #[test]
    fn test_unknown_dialect() {
        assert!(matches!(
            open_driver("oracle", "x"),
            Err(DriverError::UnsupportedDialect(_))
        ));
    }
}
