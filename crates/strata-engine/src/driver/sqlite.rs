//! SQLite driver
//!
//! Uses a simple Arc<Mutex<Connection>> per pooled connection; every call
//! hops onto the blocking pool since rusqlite is synchronous.

use super::{json_text, Connection, Driver};
use crate::error::{DriverError, DriverResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::types::{Value as SqlValue, ValueRef};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use strata_core::dialect::Sqlite;
use strata_core::{Cell, ColumnInfo, ResultSet, SqlDialect};
use tracing::debug;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct SqliteDriver {
    path: PathBuf,
}

impl SqliteDriver {
    /// Accepts a bare path or a `sqlite://` / `sqlite:` URL.
    ///
    /// `:memory:` gives every connection its own database, so pooled use
    /// needs a file.
    pub fn new(url: &str) -> Self {
        let path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url);
        Self {
            path: PathBuf::from(path),
        }
    }
}

#[async_trait]
impl Driver for SqliteDriver {
    fn dialect(&self) -> &'static str {
        "sqlite"
    }

    async fn connect(&self) -> DriverResult<Box<dyn Connection>> {
        let path = self.path.clone();
        let conn = tokio::task::spawn_blocking(move || -> DriverResult<rusqlite::Connection> {
            let conn = if path.to_str() == Some(":memory:") {
                rusqlite::Connection::open_in_memory()?
            } else {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        DriverError::Connection(format!("Failed to create directory: {}", e))
                    })?;
                }
                rusqlite::Connection::open(&path)?
            };
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            conn.busy_timeout(BUSY_TIMEOUT)?;
            debug!(path = ?path, "Opened SQLite connection");
            Ok(conn)
        })
        .await
        .map_err(|e| DriverError::Task(e.to_string()))??;

        Ok(Box::new(SqliteConnection::new(conn)))
    }
}

/// One SQLite handle
#[derive(Clone)]
pub struct SqliteConnection {
    conn: Arc<Mutex<rusqlite::Connection>>,
}

impl SqliteConnection {
    pub fn new(conn: rusqlite::Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    async fn run<F, T>(&self, f: F) -> DriverResult<T>
    where
        F: FnOnce(&rusqlite::Connection) -> DriverResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            f(&conn)
        })
        .await
        .map_err(|e| DriverError::Task(e.to_string()))?
    }
}

fn bind(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        other => SqlValue::Text(json_text(other)),
    }
}

fn cell(value: ValueRef<'_>) -> Cell {
    match value {
        ValueRef::Null => Cell::Null,
        ValueRef::Integer(i) => Cell::Int(i),
        ValueRef::Real(f) => Cell::Float(f),
        ValueRef::Text(t) => Cell::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Cell::Bytes(b.to_vec()),
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    async fn query(&mut self, sql: &str, params: &[Value]) -> DriverResult<ResultSet> {
        let sql = sql.to_string();
        let bound: Vec<SqlValue> = params.iter().map(bind).collect();

        self.run(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let columns: Vec<ColumnInfo> = stmt
                .columns()
                .iter()
                .map(|c| {
                    let declared = c.decl_type().unwrap_or("");
                    ColumnInfo::new(c.name(), declared, Sqlite.map_native_type(declared))
                })
                .collect();

            let width = columns.len();
            let mut rows = Vec::new();
            let mut cursor = stmt.query(rusqlite::params_from_iter(bound.iter()))?;
            while let Some(row) = cursor.next()? {
                let mut cells = Vec::with_capacity(width);
                for i in 0..width {
                    cells.push(cell(row.get_ref(i)?));
                }
                rows.push(cells);
            }
            drop(cursor);

            let rows_affected = if width == 0 { conn.changes() } else { rows.len() as u64 };
            Ok(ResultSet {
                columns,
                rows,
                rows_affected,
                last_insert_id: Some(conn.last_insert_rowid()),
            })
        })
        .await
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> DriverResult<ResultSet> {
        let sql = sql.to_string();
        let bound: Vec<SqlValue> = params.iter().map(bind).collect();

        self.run(move |conn| {
            let changed = conn.execute(&sql, rusqlite::params_from_iter(bound.iter()))?;
            Ok(ResultSet {
                rows_affected: changed as u64,
                last_insert_id: Some(conn.last_insert_rowid()),
                ..Default::default()
            })
        })
        .await
    }

    async fn batch(&mut self, sql: &str) -> DriverResult<()> {
        let sql = sql.to_string();
        self.run(move |conn| Ok(conn.execute_batch(&sql)?)).await
    }
}
