//! Column metadata captured by introspection

use serde::{Deserialize, Serialize};
use std::fmt;

/// Engine-neutral column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NormalizedType {
    Integer,
    Float,
    Decimal,
    String,
    Boolean,
    Date,
    DateTime,
    Time,
    Json,
    Uuid,
    Binary,
    NotSupported,
}

impl NormalizedType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Integer => "Integer",
            Self::Float => "Float",
            Self::Decimal => "Decimal",
            Self::String => "String",
            Self::Boolean => "Boolean",
            Self::Date => "Date",
            Self::DateTime => "DateTime",
            Self::Time => "Time",
            Self::Json => "JSON",
            Self::Uuid => "UUID",
            Self::Binary => "Binary",
            Self::NotSupported => "NotSupported",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Float | Self::Decimal)
    }
}

impl fmt::Display for NormalizedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target of a foreign key column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyRef {
    pub schema_name: String,
    pub table_name: String,
    pub column_name: String,
    pub delete_rule: Option<String>,
}

/// Metadata for one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub schema_name: String,
    pub table_name: String,
    pub column_name: String,
    /// Type name as reported by the engine
    pub native_type: String,
    pub normalized_type: NormalizedType,
    pub is_primary_key: bool,
    pub is_unique: bool,
    pub is_nullable: bool,
    pub constraint_name: Option<String>,
    pub ordinal_position: i64,
    pub default_value: Option<String>,
    pub is_auto_increment: bool,
    pub max_length: Option<i64>,
    pub numeric_precision: Option<i64>,
    pub numeric_scale: Option<i64>,
    pub foreign_key: Option<ForeignKeyRef>,
    /// Masking rule attached after capture
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub masking_rule: Option<String>,
}

impl ColumnMeta {
    /// Minimal metadata, mostly for tests and hand-built schemas
    pub fn new(
        table_name: impl Into<String>,
        column_name: impl Into<String>,
        normalized_type: NormalizedType,
    ) -> Self {
        Self {
            schema_name: String::new(),
            table_name: table_name.into(),
            column_name: column_name.into(),
            native_type: normalized_type.as_str().to_lowercase(),
            normalized_type,
            is_primary_key: false,
            is_unique: false,
            is_nullable: true,
            constraint_name: None,
            ordinal_position: 0,
            default_value: None,
            is_auto_increment: false,
            max_length: None,
            numeric_precision: None,
            numeric_scale: None,
            foreign_key: None,
            masking_rule: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.is_unique = true;
        self.is_nullable = false;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.is_auto_increment = true;
        self
    }

    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.foreign_key = Some(ForeignKeyRef {
            schema_name: self.schema_name.clone(),
            table_name: table.into(),
            column_name: column.into(),
            delete_rule: None,
        });
        self
    }
}
