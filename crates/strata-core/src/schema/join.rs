//! Join definitions between table pairs

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Separator between the two table names of a join key
pub const JOIN_KEY_SEPARATOR: &str = "___";

/// `table1___table2`
pub fn join_key(table1: &str, table2: &str) -> String {
    format!("{}{}{}", table1, JOIN_KEY_SEPARATOR, table2)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    Inner,
    #[default]
    Left,
    Right,
}

impl JoinKind {
    pub fn sql(&self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
            Self::Right => "RIGHT JOIN",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "inner" => Some(Self::Inner),
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            _ => None,
        }
    }
}

/// Join between an unordered pair of tables.
///
/// `table1_cols[i] = table2_cols[i]` for every `i`. Joins inferred from a
/// foreign key put the referenced table on side 1 and the referencing table
/// on side 2.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableJoin {
    pub table1: String,
    pub table2: String,
    pub table1_cols: Vec<String>,
    pub table2_cols: Vec<String>,
    /// Both tables are in the active schema
    pub is_active: bool,
    /// Created by an administrator rather than inferred
    pub is_custom: bool,
    /// Extra non-equality condition, compiled as a filter tree whose
    /// string values are column references
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complex_condition: Option<Value>,
}

impl TableJoin {
    pub fn new(
        table1: impl Into<String>,
        table1_cols: Vec<String>,
        table2: impl Into<String>,
        table2_cols: Vec<String>,
    ) -> Self {
        Self {
            table1: table1.into(),
            table2: table2.into(),
            table1_cols,
            table2_cols,
            is_active: true,
            is_custom: true,
            complex_condition: None,
        }
    }

    pub fn key(&self) -> String {
        join_key(&self.table1, &self.table2)
    }

    /// Exchange side 1 and side 2
    pub fn swapped(&self) -> Self {
        Self {
            table1: self.table2.clone(),
            table2: self.table1.clone(),
            table1_cols: self.table2_cols.clone(),
            table2_cols: self.table1_cols.clone(),
            is_active: self.is_active,
            is_custom: self.is_custom,
            complex_condition: self.complex_condition.clone(),
        }
    }

    /// Column pairs `(table1.col, table2.col)`
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.table1_cols
            .iter()
            .zip(self.table2_cols.iter())
            .map(|(a, b)| (a.as_str(), b.as_str()))
    }

    /// Equality condition `t1.a = t2.b AND ...`
    pub fn equality_condition(&self) -> String {
        self.pairs()
            .map(|(a, b)| format!("{}.{} = {}.{}", self.table1, a, self.table2, b))
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}
