//! SQL Server driver on tiberius.
//!
//! Statements are generated with `?` markers; they are renumbered to
//! `@P1, @P2, ...` here.

use super::{json_text, number_markers, Connection, Driver};
use crate::error::DriverResult;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value;
use strata_core::dialect::MsSql;
use strata_core::{Cell, ColumnInfo, ResultSet, SqlDialect};
use tiberius::{Client, Column, ColumnData, ColumnType, Config, Row, ToSql};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct MsSqlDriver {
    config: Config,
}

impl MsSqlDriver {
    /// `url` is an ADO.NET connection string
    pub fn new(url: &str) -> DriverResult<Self> {
        Ok(Self {
            config: Config::from_ado_string(url)?,
        })
    }
}

#[async_trait]
impl Driver for MsSqlDriver {
    fn dialect(&self) -> &'static str {
        "mssql"
    }

    async fn connect(&self) -> DriverResult<Box<dyn Connection>> {
        let tcp = TcpStream::connect(self.config.get_addr()).await?;
        tcp.set_nodelay(true)?;
        let client = Client::connect(self.config.clone(), tcp.compat_write()).await?;
        debug!("Opened SQL Server connection");
        Ok(Box::new(MsSqlConnection { client }))
    }
}

struct MsSqlConnection {
    client: Client<Compat<TcpStream>>,
}

fn params(values: &[Value]) -> Vec<Box<dyn ToSql>> {
    values
        .iter()
        .map(|value| -> Box<dyn ToSql> {
            match value {
                Value::Null => Box::new(Option::<String>::None),
                Value::Bool(b) => Box::new(*b),
                Value::Number(n) => match n.as_i64() {
                    Some(i) => Box::new(i),
                    None => Box::new(n.as_f64().unwrap_or_default()),
                },
                other => Box::new(json_text(other)),
            }
        })
        .collect()
}

fn type_name(column: &Column) -> &'static str {
    match column.column_type() {
        ColumnType::Bit | ColumnType::Bitn => "bit",
        ColumnType::Int1 => "tinyint",
        ColumnType::Int2 => "smallint",
        ColumnType::Int4 | ColumnType::Intn => "int",
        ColumnType::Int8 => "bigint",
        ColumnType::Float4 => "real",
        ColumnType::Float8 | ColumnType::Floatn => "float",
        ColumnType::Money | ColumnType::Money4 => "money",
        ColumnType::Decimaln | ColumnType::Numericn => "decimal",
        ColumnType::Guid => "uniqueidentifier",
        ColumnType::Daten => "date",
        ColumnType::Timen => "time",
        ColumnType::Datetime | ColumnType::Datetime4 | ColumnType::Datetimen | ColumnType::Datetime2 => {
            "datetime2"
        }
        ColumnType::DatetimeOffsetn => "datetimeoffset",
        ColumnType::BigVarBin | ColumnType::BigBinary | ColumnType::Image => "varbinary",
        ColumnType::BigVarChar
        | ColumnType::BigChar
        | ColumnType::NVarchar
        | ColumnType::NChar
        | ColumnType::Text
        | ColumnType::NText => "nvarchar",
        ColumnType::Xml => "xml",
        _ => "",
    }
}

fn column_info(column: &Column) -> ColumnInfo {
    let name = type_name(column);
    ColumnInfo::new(column.name(), name, MsSql.map_native_type(name))
}

fn row_cells(row: &Row) -> DriverResult<Vec<Cell>> {
    let mut cells = Vec::with_capacity(row.len());
    for (i, (_, data)) in row.cells().enumerate() {
        let cell = match data {
            ColumnData::U8(v) => v.map(|v| Cell::Int(v.into())),
            ColumnData::I16(v) => v.map(|v| Cell::Int(v.into())),
            ColumnData::I32(v) => v.map(|v| Cell::Int(v.into())),
            ColumnData::I64(v) => v.map(Cell::Int),
            ColumnData::F32(v) => v.map(|v| Cell::Float(v.into())),
            ColumnData::F64(v) => v.map(Cell::Float),
            ColumnData::Bit(v) => v.map(Cell::Bool),
            ColumnData::String(v) => v.as_ref().map(|s| Cell::Text(s.to_string())),
            ColumnData::Guid(v) => v.map(|g| Cell::Text(g.to_string())),
            ColumnData::Binary(v) => v.as_ref().map(|b| Cell::Bytes(b.to_vec())),
            ColumnData::Numeric(v) => v.map(|n| Cell::Text(n.to_string())),
            ColumnData::Date(_) => row.try_get::<NaiveDate, _>(i)?.map(Cell::Date),
            ColumnData::Time(_) => row.try_get::<NaiveTime, _>(i)?.map(Cell::Time),
            ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
                row.try_get::<NaiveDateTime, _>(i)?.map(Cell::DateTime)
            }
            ColumnData::DateTimeOffset(_) => row
                .try_get::<DateTime<FixedOffset>, _>(i)?
                .map(|dt| Cell::DateTimeTz(dt.with_timezone(&Utc))),
            other => Some(Cell::Text(format!("{:?}", other))),
        };
        cells.push(cell.unwrap_or(Cell::Null));
    }
    Ok(cells)
}

#[async_trait]
impl Connection for MsSqlConnection {
    async fn query(&mut self, sql: &str, values: &[Value]) -> DriverResult<ResultSet> {
        let sql = number_markers(sql, "@P");
        let bound = params(values);
        let refs: Vec<&dyn ToSql> = bound.iter().map(|p| p.as_ref()).collect();

        let mut stream = self.client.query(sql, &refs).await?;
        let columns: Vec<ColumnInfo> = stream
            .columns()
            .await?
            .map(|cols| cols.iter().map(column_info).collect())
            .unwrap_or_default();
        let rows = stream.into_first_result().await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(row_cells(row)?);
        }
        Ok(ResultSet {
            columns,
            rows_affected: out.len() as u64,
            rows: out,
            last_insert_id: None,
        })
    }

    async fn execute(&mut self, sql: &str, values: &[Value]) -> DriverResult<ResultSet> {
        let sql = number_markers(sql, "@P");
        let bound = params(values);
        let refs: Vec<&dyn ToSql> = bound.iter().map(|p| p.as_ref()).collect();

        let result = self.client.execute(sql, &refs).await?;
        Ok(ResultSet {
            rows_affected: result.total(),
            ..Default::default()
        })
    }

    async fn batch(&mut self, sql: &str) -> DriverResult<()> {
        self.client.simple_query(sql).await?.into_results().await?;
        Ok(())
    }
}
