//! `where` filter trees.
//!
//! A filter value is a scalar (`column = literal`) or a map whose keys are
//! operators or column path segments. Absent and `null` values contribute
//! nothing.

use crate::dialect::SqlDialect;
use crate::error::{StrataError, StrataResult};
use crate::guard;
use crate::ident::{ensure_identifier, normalize_table, qualify};
use serde_json::{Map, Value};
use tracing::warn;

/// Prefix marking a key as a literal left-hand side
pub const CONST_PREFIX: &str = "CONST_";

#[derive(Debug, Clone)]
enum Lhs {
    Path(String),
    Const(String),
}

fn comparison(op: &str) -> Option<&'static str> {
    match op {
        "$eq" => Some("="),
        "$ne" => Some("<>"),
        "$gt" => Some(">"),
        "$gte" => Some(">="),
        "$lt" => Some("<"),
        "$lte" => Some("<="),
        _ => None,
    }
}

/// Render a JSON value as an inline SQL literal
pub fn sql_literal(dialect: &dyn SqlDialect, value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => dialect.bool_literal(*b).to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote_string(s),
        other => quote_string(&other.to_string()),
    }
}

fn quote_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Compiles filter trees against a default table
pub struct FilterCompiler<'a> {
    dialect: &'a dyn SqlDialect,
    default_table: &'a str,
    column_references: bool,
}

impl<'a> FilterCompiler<'a> {
    pub fn new(dialect: &'a dyn SqlDialect, default_table: &'a str) -> Self {
        Self {
            dialect,
            default_table,
            column_references: false,
        }
    }

    /// Treat string right-hand sides as column references (join conditions)
    pub fn column_references(mut self) -> Self {
        self.column_references = true;
        self
    }

    /// Compile a filter tree; `None` when nothing applies
    pub fn compile(&self, value: &Value) -> StrataResult<Option<String>> {
        guard::check_value("where", value)?;
        self.node(None, value)
    }

    fn node(&self, lhs: Option<&Lhs>, value: &Value) -> StrataResult<Option<String>> {
        match value {
            Value::Null => Ok(None),
            Value::Object(map) => self.map(lhs, map),
            Value::Array(_) => Err(StrataError::invalid(format!(
                "filter on `{}` must be a scalar or an object",
                lhs.map_or("where", lhs_name)
            ))),
            scalar => {
                let lhs = lhs.ok_or_else(|| {
                    StrataError::invalid("filter must be an object at the top level")
                })?;
                Ok(Some(format!("{} = {}", self.render_lhs(lhs)?, self.rhs(scalar)?)))
            }
        }
    }

    fn map(&self, lhs: Option<&Lhs>, map: &Map<String, Value>) -> StrataResult<Option<String>> {
        let mut clauses = Vec::new();

        for (key, value) in map {
            if value.is_null() {
                continue;
            }

            let clause = match key.as_str() {
                "$or" | "or" => self.logical(lhs, key, value, " OR ")?,
                "$and" | "and" => self.logical(lhs, key, value, " AND ")?,
                "$like" => {
                    let lhs = self.require_lhs(lhs, key)?;
                    let text = match value {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    Some(format!(
                        "{} LIKE {}",
                        self.render_lhs(lhs)?,
                        quote_string(&format!("%{}%", text))
                    ))
                }
                "$null" => {
                    let lhs = self.require_lhs(lhs, key)?;
                    let is_null = value.as_bool().ok_or_else(|| {
                        StrataError::invalid(format!("`$null` on `{}` must be a boolean", lhs_name(lhs)))
                    })?;
                    let test = if is_null { "IS NULL" } else { "IS NOT NULL" };
                    Some(format!("{} {}", self.render_lhs(lhs)?, test))
                }
                "$in" | "$nin" => {
                    let lhs = self.require_lhs(lhs, key)?;
                    match value.as_array() {
                        Some(items) if !items.is_empty() => {
                            let list = items
                                .iter()
                                .map(|v| self.rhs(v))
                                .collect::<StrataResult<Vec<_>>>()?
                                .join(", ");
                            let op = if key == "$in" { "IN" } else { "NOT IN" };
                            Some(format!("{} {} ({})", self.render_lhs(lhs)?, op, list))
                        }
                        _ => {
                            warn!(column = %lhs_name(lhs), operator = %key, "Skipping filter branch without a non-empty array");
                            None
                        }
                    }
                }
                op if comparison(op).is_some() => {
                    let lhs = self.require_lhs(lhs, key)?;
                    let sql_op = comparison(op).unwrap_or("=");
                    Some(format!("{} {} {}", self.render_lhs(lhs)?, sql_op, self.rhs(value)?))
                }
                op if op.starts_with('$') => {
                    return Err(StrataError::invalid(format!("unknown filter operator `{}`", op)))
                }
                segment => {
                    let next = match (lhs, segment.strip_prefix(CONST_PREFIX)) {
                        (_, Some(constant)) => Lhs::Const(constant.to_string()),
                        (Some(Lhs::Path(path)), None) => Lhs::Path(format!("{}.{}", path, segment)),
                        (_, None) => Lhs::Path(segment.to_string()),
                    };
                    self.node(Some(&next), value)?
                }
            };

            if let Some(clause) = clause {
                clauses.push(clause);
            }
        }

        Ok(if clauses.is_empty() {
            None
        } else {
            Some(clauses.join(" AND "))
        })
    }

    fn logical(
        &self,
        lhs: Option<&Lhs>,
        key: &str,
        value: &Value,
        joiner: &str,
    ) -> StrataResult<Option<String>> {
        let items = value
            .as_array()
            .ok_or_else(|| StrataError::invalid(format!("`{}` requires an array", key)))?;

        let mut parts = Vec::with_capacity(items.len());
        for item in items {
            if let Some(part) = self.node(lhs, item)? {
                parts.push(part);
            }
        }

        Ok(match parts.len() {
            0 => None,
            _ => Some(format!("({})", parts.join(joiner))),
        })
    }

    fn require_lhs<'l>(&self, lhs: Option<&'l Lhs>, op: &str) -> StrataResult<&'l Lhs> {
        lhs.ok_or_else(|| StrataError::invalid(format!("operator `{}` needs a column", op)))
    }

    fn render_lhs(&self, lhs: &Lhs) -> StrataResult<String> {
        match lhs {
            Lhs::Const(constant) => Ok(constant_literal(constant)),
            Lhs::Path(path) => self.column(path),
        }
    }

    fn column(&self, path: &str) -> StrataResult<String> {
        let qualified = qualify(self.default_table, path);
        ensure_identifier("where", &qualified)?;
        Ok(qualified)
    }

    fn rhs(&self, value: &Value) -> StrataResult<String> {
        match value {
            Value::String(s) if self.column_references => self.column(&normalize_table(s)),
            other => Ok(sql_literal(self.dialect, other)),
        }
    }
}

fn lhs_name(lhs: &Lhs) -> &str {
    match lhs {
        Lhs::Path(p) | Lhs::Const(p) => p,
    }
}

fn constant_literal(constant: &str) -> String {
    if constant.parse::<f64>().is_ok() {
        constant.to_string()
    } else {
        quote_string(constant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{MsSql, Postgres};
    use serde_json::json;

    fn compile(value: Value) -> StrataResult<Option<String>> {
        FilterCompiler::new(&Postgres, "users").compile(&value)
    }

    #[test]
    fn test_scalar_and_comparisons() {
        assert_eq!(
            compile(json!({"name": "o'neil", "age": {"$gte": 18, "$lt": 65}})).unwrap(),
            Some("users.name = 'o''neil' AND users.age >= 18 AND users.age < 65".to_string())
        );
    }

    #[test]
    fn test_comparisons_form_pure_conjunction() {
        let sql = compile(json!({
            "a": {"$eq": 1, "$ne": 2},
            "b": {"$gt": 3, "$lte": 4}
        }))
        .unwrap()
        .unwrap();
        assert!(!sql.contains(" OR "));
        assert_eq!(sql.matches(" AND ").count(), 3);
    }

    #[test]
    fn test_or_is_parenthesized() {
        assert_eq!(
            compile(json!({"$or": [{"age": {"$lt": 18}}, {"name": "root"}], "active": true})).unwrap(),
            Some("(users.age < 18 OR users.name = 'root') AND users.active = true".to_string())
        );
        assert!(compile(json!({"or": {"a": 1}})).is_err());
    }

    #[test]
    fn test_like_null_in() {
        assert_eq!(
            compile(json!({"name": {"$like": "ann"}})).unwrap(),
            Some("users.name LIKE '%ann%'".to_string())
        );
        assert_eq!(
            compile(json!({"email": {"$null": false}})).unwrap(),
            Some("users.email IS NOT NULL".to_string())
        );
        assert_eq!(
            compile(json!({"id": {"$in": [1, 2]}, "role": {"$nin": ["x"]}})).unwrap(),
            Some("users.id IN (1, 2) AND users.role NOT IN ('x')".to_string())
        );
    }

    #[test]
    fn test_in_without_array_is_skipped() {
        assert_eq!(compile(json!({"id": {"$in": 5}})).unwrap(), None);
        assert_eq!(compile(json!({"id": {"$in": []}, "a": 1})).unwrap(), Some("users.a = 1".to_string()));
    }

    #[test]
    fn test_nested_paths_and_constants() {
        assert_eq!(
            compile(json!({"orders": {"total": {"$gt": 5}}})).unwrap(),
            Some("orders.total > 5".to_string())
        );
        assert_eq!(
            compile(json!({"sales__orders.total": 1})).unwrap(),
            Some("sales.orders.total = 1".to_string())
        );
        assert_eq!(
            compile(json!({"CONST_1": {"$eq": 1}})).unwrap(),
            Some("1 = 1".to_string())
        );
    }

    #[test]
    fn test_null_values_are_skipped() {
        assert_eq!(compile(json!({"age": null, "name": {"$eq": null}})).unwrap(), None);
        assert_eq!(compile(json!(null)).unwrap(), None);
    }

    #[test]
    fn test_blocked_values_fail() {
        let err = compile(json!({"name": "x'; DROP TABLE users"})).unwrap_err();
        assert!(matches!(err, StrataError::SuspiciousInput { .. }));
        let err = compile(json!({"name": {"$like": "a' or '1"}})).unwrap_err();
        assert!(matches!(err, StrataError::SuspiciousInput { .. }));
    }

    #[test]
    fn test_unsafe_path_rejected() {
        assert!(compile(json!({"a b": 1})).is_err());
        assert!(compile(json!({"age": {"$between": [1, 2]}})).is_err());
    }

    #[test]
    fn test_bool_literals_follow_dialect() {
        let sql = FilterCompiler::new(&MsSql, "t").compile(&json!({"flag": true})).unwrap();
        assert_eq!(sql, Some("t.flag = 1".to_string()));
    }

    #[test]
    fn test_column_reference_mode() {
        let sql = FilterCompiler::new(&Postgres, "orders")
            .column_references()
            .compile(&json!({"orders.created_at": {"$gte": "users.signup_at"}}))
            .unwrap();
        assert_eq!(sql, Some("orders.created_at >= users.signup_at".to_string()));
    }
}
