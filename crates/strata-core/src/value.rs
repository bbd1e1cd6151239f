//! Driver-neutral result cells and their JSON coercion

use crate::schema::NormalizedType;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::{Map, Number, Value};

/// Date format used for pure-date columns
pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const TIME_FORMAT: &str = "%H:%M:%S";

/// One value as delivered by a driver
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Raw buffer; numeric and JSON columns often arrive this way
    Bytes(Vec<u8>),
    Json(Value),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    DateTimeTz(DateTime<Utc>),
    Time(NaiveTime),
}

/// Column of a result set
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    /// Column label as returned (for compiled queries, the wire alias)
    pub name: String,
    /// Engine type name, empty when the driver cannot report one
    pub type_name: String,
    pub normalized: NormalizedType,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, normalized: NormalizedType) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            normalized,
        }
    }
}

/// Rows returned by a single statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Vec<Cell>>,
    pub rows_affected: u64,
    /// Generated key of the first inserted row, for engines without RETURNING
    pub last_insert_id: Option<i64>,
}

impl ResultSet {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Coerced row as a JSON object keyed by column name
    pub fn row_object(&self, index: usize) -> Map<String, Value> {
        let mut object = Map::new();
        if let Some(row) = self.rows.get(index) {
            for (column, cell) in self.columns.iter().zip(row) {
                object.insert(column.name.clone(), coerce_cell(cell, column.normalized));
            }
        }
        object
    }

    pub fn to_objects(&self) -> Vec<Value> {
        (0..self.rows.len())
            .map(|i| Value::Object(self.row_object(i)))
            .collect()
    }
}

fn float_value(value: f64) -> Value {
    Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
}

fn text_value(text: &str, ty: NormalizedType) -> Value {
    match ty {
        NormalizedType::Json => {
            serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
        }
        NormalizedType::Decimal | NormalizedType::Float => match text.trim().parse::<f64>() {
            Ok(value) => float_value(value),
            Err(_) => Value::String(text.to_string()),
        },
        _ => Value::String(text.to_string()),
    }
}

/// Map a driver cell to the JSON value a caller sees.
///
/// Numeric buffers become floats, JSON columns are decoded, pure dates use
/// [`DATE_FORMAT`] and binary payloads are base64 encoded.
pub fn coerce_cell(cell: &Cell, ty: NormalizedType) -> Value {
    match cell {
        Cell::Null => Value::Null,
        Cell::Bool(b) => Value::Bool(*b),
        Cell::Int(i) if ty == NormalizedType::Boolean => Value::Bool(*i != 0),
        Cell::Int(i) => Value::Number((*i).into()),
        Cell::Float(f) => float_value(*f),
        Cell::Text(text) => text_value(text, ty),
        Cell::Bytes(bytes) => match ty {
            NormalizedType::Binary => Value::String(BASE64.encode(bytes)),
            NormalizedType::Json => serde_json::from_slice(bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned())),
            _ => match std::str::from_utf8(bytes) {
                Ok(text) if ty.is_numeric() => match text.trim().parse::<f64>() {
                    Ok(value) => float_value(value),
                    Err(_) => Value::String(text.to_string()),
                },
                Ok(text) => Value::String(text.to_string()),
                Err(_) => Value::String(BASE64.encode(bytes)),
            },
        },
        Cell::Json(value) => value.clone(),
        Cell::Date(date) => Value::String(date.format(DATE_FORMAT).to_string()),
        Cell::DateTime(dt) if ty == NormalizedType::Date => {
            Value::String(dt.format(DATE_FORMAT).to_string())
        }
        Cell::DateTime(dt) => Value::String(dt.format(DATETIME_FORMAT).to_string()),
        Cell::DateTimeTz(dt) if ty == NormalizedType::Date => {
            Value::String(dt.format(DATE_FORMAT).to_string())
        }
        Cell::DateTimeTz(dt) => Value::String(dt.to_rfc3339()),
        Cell::Time(t) => Value::String(t.format(TIME_FORMAT).to_string()),
    }
}

/// String rendition of a coerced value for CSV output
pub fn value_to_csv_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numeric_bytes_become_float() {
        let cell = Cell::Bytes(b"12.50".to_vec());
        assert_eq!(coerce_cell(&cell, NormalizedType::Decimal), json!(12.5));
    }

    #[test]
    fn test_json_text_is_decoded() {
        let cell = Cell::Text(r#"{"a":[1,2]}"#.to_string());
        assert_eq!(coerce_cell(&cell, NormalizedType::Json), json!({"a": [1, 2]}));
        let broken = Cell::Text("{oops".to_string());
        assert_eq!(coerce_cell(&broken, NormalizedType::Json), json!("{oops"));
    }

    #[test]
    fn test_dates_use_fixed_format() {
        let dt = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(13, 4, 5)
            .unwrap();
        assert_eq!(
            coerce_cell(&Cell::DateTime(dt), NormalizedType::Date),
            json!("2024-03-09")
        );
        assert_eq!(
            coerce_cell(&Cell::DateTime(dt), NormalizedType::DateTime),
            json!("2024-03-09 13:04:05")
        );
    }

    #[test]
    fn test_binary_is_base64() {
        let cell = Cell::Bytes(vec![0xff, 0x00]);
        assert_eq!(coerce_cell(&cell, NormalizedType::Binary), json!("/wA="));
    }

    #[test]
    fn test_integer_booleans() {
        assert_eq!(coerce_cell(&Cell::Int(1), NormalizedType::Boolean), json!(true));
        assert_eq!(coerce_cell(&Cell::Int(7), NormalizedType::Integer), json!(7));
    }

    #[test]
    fn test_row_object() {
        let rs = ResultSet {
            columns: vec![
                ColumnInfo::new("id", "INTEGER", NormalizedType::Integer),
                ColumnInfo::new("name", "TEXT", NormalizedType::String),
            ],
            rows: vec![vec![Cell::Int(1), Cell::Text("ann".into())]],
            ..Default::default()
        };
        assert_eq!(
            Value::Object(rs.row_object(0)),
            json!({"id": 1, "name": "ann"})
        );
        assert_eq!(value_to_csv_string(&json!(null)), "");
        assert_eq!(value_to_csv_string(&json!(3)), "3");
    }
}
