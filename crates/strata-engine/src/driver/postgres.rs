//! Postgres driver on tokio-postgres.
//!
//! Parameters are converted by the prepared statement's declared types,
//! so a JSON number bound to a `numeric` column arrives as a decimal and a
//! string bound to a `date` column is parsed first.

use super::{json_text, Connection, Driver};
use crate::error::{DriverError, DriverResult};
use async_trait::async_trait;
use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use std::error::Error;
use std::str::FromStr;
use strata_core::dialect::Postgres;
use strata_core::value::{DATETIME_FORMAT, DATE_FORMAT, TIME_FORMAT};
use strata_core::{Cell, ColumnInfo, ResultSet, SqlDialect};
use tokio_postgres::types::{FromSql, IsNull, ToSql, Type};
use tokio_postgres::{Client, NoTls, Row};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct PostgresDriver {
    url: String,
}

impl PostgresDriver {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl Driver for PostgresDriver {
    fn dialect(&self) -> &'static str {
        "postgres"
    }

    async fn connect(&self) -> DriverResult<Box<dyn Connection>> {
        let (client, connection) = tokio_postgres::connect(&self.url, NoTls).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(error = %e, "Postgres connection closed with an error");
            }
        });
        debug!("Opened Postgres connection");
        Ok(Box::new(PostgresConnection { client }))
    }
}

struct PostgresConnection {
    client: Client,
}

/// JSON value bound according to the target parameter type
#[derive(Debug)]
struct Param(Value);

type BoxError = Box<dyn Error + Sync + Send>;

impl ToSql for Param {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        let value = &self.0;
        if value.is_null() {
            return Ok(IsNull::Yes);
        }
        match *ty {
            Type::BOOL => match value {
                Value::Bool(b) => b.to_sql(ty, out),
                other => (number(other)? != 0.0).to_sql(ty, out),
            },
            Type::INT2 => (number(value)? as i16).to_sql(ty, out),
            Type::INT4 => (number(value)? as i32).to_sql(ty, out),
            Type::INT8 => match value.as_i64() {
                Some(i) => i.to_sql(ty, out),
                None => (number(value)? as i64).to_sql(ty, out),
            },
            Type::FLOAT4 => (number(value)? as f32).to_sql(ty, out),
            Type::FLOAT8 => number(value)?.to_sql(ty, out),
            Type::NUMERIC => Decimal::from_str(&json_text(value))?.to_sql(ty, out),
            Type::JSON | Type::JSONB => value.to_sql(ty, out),
            Type::DATE => NaiveDate::parse_from_str(&json_text(value), DATE_FORMAT)?.to_sql(ty, out),
            Type::TIMESTAMP => {
                NaiveDateTime::parse_from_str(&json_text(value), DATETIME_FORMAT)?.to_sql(ty, out)
            }
            Type::TIMESTAMPTZ => {
                DateTime::parse_from_rfc3339(&json_text(value))?
                    .with_timezone(&Utc)
                    .to_sql(ty, out)
            }
            Type::TIME => NaiveTime::parse_from_str(&json_text(value), TIME_FORMAT)?.to_sql(ty, out),
            _ => json_text(value).to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    tokio_postgres::types::to_sql_checked!();
}

fn number(value: &Value) -> Result<f64, BoxError> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| "number out of range".into()),
        Value::Bool(b) => Ok(f64::from(u8::from(*b))),
        Value::String(s) => Ok(s.trim().parse::<f64>()?),
        other => Err(format!("cannot bind {} as a number", other).into()),
    }
}

/// Undecoded column payload for types without a dedicated mapping
struct Raw(Vec<u8>);

impl<'a> FromSql<'a> for Raw {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        Ok(Raw(raw.to_vec()))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

fn cell(row: &Row, i: usize) -> DriverResult<Cell> {
    let ty = row.columns()[i].type_().clone();
    let cell = match ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(i)?.map(Cell::Bool),
        Type::INT2 => row.try_get::<_, Option<i16>>(i)?.map(|v| Cell::Int(v.into())),
        Type::INT4 => row.try_get::<_, Option<i32>>(i)?.map(|v| Cell::Int(v.into())),
        Type::INT8 => row.try_get::<_, Option<i64>>(i)?.map(Cell::Int),
        Type::FLOAT4 => row.try_get::<_, Option<f32>>(i)?.map(|v| Cell::Float(v.into())),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(i)?.map(Cell::Float),
        Type::NUMERIC => row
            .try_get::<_, Option<Decimal>>(i)?
            .map(|d| Cell::Text(d.to_string())),
        Type::JSON | Type::JSONB => row.try_get::<_, Option<Value>>(i)?.map(Cell::Json),
        Type::DATE => row.try_get::<_, Option<NaiveDate>>(i)?.map(Cell::Date),
        Type::TIMESTAMP => row.try_get::<_, Option<NaiveDateTime>>(i)?.map(Cell::DateTime),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(i)?
            .map(Cell::DateTimeTz),
        Type::TIME => row.try_get::<_, Option<NaiveTime>>(i)?.map(Cell::Time),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
            row.try_get::<_, Option<String>>(i)?.map(Cell::Text)
        }
        Type::BYTEA => row.try_get::<_, Option<Vec<u8>>>(i)?.map(Cell::Bytes),
        _ => row.try_get::<_, Option<Raw>>(i)?.map(|raw| Cell::Bytes(raw.0)),
    };
    Ok(cell.unwrap_or(Cell::Null))
}

impl PostgresConnection {
    async fn prepare(&self, sql: &str, params: &[Value]) -> DriverResult<(tokio_postgres::Statement, Vec<Param>)> {
        let statement = self.client.prepare(sql).await?;
        if statement.params().len() != params.len() {
            return Err(DriverError::Parameter(format!(
                "statement expects {} parameters, got {}",
                statement.params().len(),
                params.len()
            )));
        }
        Ok((statement, params.iter().cloned().map(Param).collect()))
    }
}

fn refs(params: &[Param]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

#[async_trait]
impl Connection for PostgresConnection {
    async fn query(&mut self, sql: &str, params: &[Value]) -> DriverResult<ResultSet> {
        let (statement, bound) = self.prepare(sql, params).await?;
        let columns: Vec<ColumnInfo> = statement
            .columns()
            .iter()
            .map(|c| {
                let name = c.type_().name();
                ColumnInfo::new(c.name(), name, Postgres.map_native_type(name))
            })
            .collect();

        let rows = self.client.query(&statement, &refs(&bound)).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut cells = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                cells.push(cell(row, i)?);
            }
            out.push(cells);
        }

        Ok(ResultSet {
            columns,
            rows_affected: out.len() as u64,
            rows: out,
            last_insert_id: None,
        })
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> DriverResult<ResultSet> {
        let (statement, bound) = self.prepare(sql, params).await?;
        let affected = self.client.execute(&statement, &refs(&bound)).await?;
        Ok(ResultSet {
            rows_affected: affected,
            ..Default::default()
        })
    }

    async fn batch(&mut self, sql: &str) -> DriverResult<()> {
        Ok(self.client.batch_execute(sql).await?)
    }
}
