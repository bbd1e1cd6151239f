//! MySQL driver on mysql_async

use super::{json_text, Connection, Driver};
use crate::error::{DriverError, DriverResult};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use mysql_async::consts::ColumnType;
use mysql_async::prelude::Queryable;
use mysql_async::{Column, Conn, Opts, Params, Row, Value as MyValue};
use serde_json::Value;
use strata_core::dialect::MySql;
use strata_core::{Cell, ColumnInfo, ResultSet, SqlDialect};
use tracing::debug;

/// Character set id MySQL reports for binary strings
const BINARY_CHARSET: u16 = 63;

#[derive(Debug, Clone)]
pub struct MySqlDriver {
    url: String,
}

impl MySqlDriver {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl Driver for MySqlDriver {
    fn dialect(&self) -> &'static str {
        "mysql"
    }

    async fn connect(&self) -> DriverResult<Box<dyn Connection>> {
        let opts = Opts::from_url(&self.url).map_err(|e| DriverError::Connection(e.to_string()))?;
        let conn = Conn::new(opts).await?;
        debug!("Opened MySQL connection");
        Ok(Box::new(MySqlConnection { conn }))
    }
}

struct MySqlConnection {
    conn: Conn,
}

fn params(values: &[Value]) -> Params {
    if values.is_empty() {
        return Params::Empty;
    }
    Params::Positional(
        values
            .iter()
            .map(|value| match value {
                Value::Null => MyValue::NULL,
                Value::Bool(b) => MyValue::Int(i64::from(*b)),
                Value::Number(n) => match (n.as_i64(), n.as_u64()) {
                    (Some(i), _) => MyValue::Int(i),
                    (None, Some(u)) => MyValue::UInt(u),
                    _ => MyValue::Double(n.as_f64().unwrap_or_default()),
                },
                other => MyValue::Bytes(json_text(other).into_bytes()),
            })
            .collect(),
    )
}

fn type_name(column: &Column) -> &'static str {
    use ColumnType::*;
    match column.column_type() {
        MYSQL_TYPE_TINY => "tinyint",
        MYSQL_TYPE_SHORT => "smallint",
        MYSQL_TYPE_INT24 => "mediumint",
        MYSQL_TYPE_LONG => "int",
        MYSQL_TYPE_LONGLONG => "bigint",
        MYSQL_TYPE_YEAR => "year",
        MYSQL_TYPE_FLOAT => "float",
        MYSQL_TYPE_DOUBLE => "double",
        MYSQL_TYPE_DECIMAL | MYSQL_TYPE_NEWDECIMAL => "decimal",
        MYSQL_TYPE_VARCHAR | MYSQL_TYPE_VAR_STRING | MYSQL_TYPE_STRING => {
            if column.character_set() == BINARY_CHARSET {
                "varbinary"
            } else {
                "varchar"
            }
        }
        MYSQL_TYPE_ENUM => "enum",
        MYSQL_TYPE_SET => "set",
        MYSQL_TYPE_BIT => "bit",
        MYSQL_TYPE_DATE | MYSQL_TYPE_NEWDATE => "date",
        MYSQL_TYPE_DATETIME | MYSQL_TYPE_DATETIME2 => "datetime",
        MYSQL_TYPE_TIMESTAMP | MYSQL_TYPE_TIMESTAMP2 => "timestamp",
        MYSQL_TYPE_TIME | MYSQL_TYPE_TIME2 => "time",
        MYSQL_TYPE_JSON => "json",
        MYSQL_TYPE_TINY_BLOB | MYSQL_TYPE_MEDIUM_BLOB | MYSQL_TYPE_LONG_BLOB | MYSQL_TYPE_BLOB => {
            // TEXT columns travel as blobs with a text character set
            if column.character_set() == BINARY_CHARSET {
                "blob"
            } else {
                "text"
            }
        }
        _ => "",
    }
}

fn cell(value: MyValue) -> Cell {
    match value {
        MyValue::NULL => Cell::Null,
        MyValue::Bytes(bytes) => Cell::Bytes(bytes),
        MyValue::Int(i) => Cell::Int(i),
        MyValue::UInt(u) => i64::try_from(u).map(Cell::Int).unwrap_or(Cell::Float(u as f64)),
        MyValue::Float(f) => Cell::Float(f.into()),
        MyValue::Double(f) => Cell::Float(f),
        MyValue::Date(year, month, day, hour, minute, second, micros) => {
            NaiveDate::from_ymd_opt(year.into(), month.into(), day.into())
                .and_then(|d| d.and_hms_micro_opt(hour.into(), minute.into(), second.into(), micros))
                .map(Cell::DateTime)
                .unwrap_or(Cell::Null)
        }
        MyValue::Time(negative, days, hours, minutes, seconds, micros) => {
            let hours = u32::from(hours) + days * 24;
            match NaiveTime::from_hms_micro_opt(hours, minutes.into(), seconds.into(), micros) {
                Some(t) if !negative => Cell::Time(t),
                _ => Cell::Text(format!(
                    "{}{:02}:{:02}:{:02}",
                    if negative { "-" } else { "" },
                    hours,
                    minutes,
                    seconds
                )),
            }
        }
    }
}

fn column_info(column: &Column) -> ColumnInfo {
    let name = type_name(column);
    ColumnInfo::new(column.name_str().into_owned(), name, MySql.map_native_type(name))
}

#[async_trait]
impl Connection for MySqlConnection {
    async fn query(&mut self, sql: &str, values: &[Value]) -> DriverResult<ResultSet> {
        let mut result = self.conn.exec_iter(sql, params(values)).await?;
        let columns: Vec<ColumnInfo> = result
            .columns()
            .map(|cols| cols.iter().map(column_info).collect())
            .unwrap_or_default();
        let rows: Vec<Row> = result.collect().await?;
        let affected = result.affected_rows();
        let last_insert_id = result.last_insert_id().and_then(|id| i64::try_from(id).ok());
        drop(result);

        let rows: Vec<Vec<Cell>> = rows
            .into_iter()
            .map(|mut row| {
                (0..row.len())
                    .map(|i| row.take::<MyValue, usize>(i).map(cell).unwrap_or(Cell::Null))
                    .collect()
            })
            .collect();
        Ok(ResultSet {
            columns,
            rows_affected: if rows.is_empty() { affected } else { rows.len() as u64 },
            rows,
            last_insert_id,
        })
    }

    async fn execute(&mut self, sql: &str, values: &[Value]) -> DriverResult<ResultSet> {
        self.conn.exec_drop(sql, params(values)).await?;
        Ok(ResultSet {
            rows_affected: self.conn.affected_rows(),
            last_insert_id: self.conn.last_insert_id().and_then(|id| i64::try_from(id).ok()),
            ..Default::default()
        })
    }

    async fn batch(&mut self, sql: &str) -> DriverResult<()> {
        Ok(self.conn.query_drop(sql).await?)
    }
}
