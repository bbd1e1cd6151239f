//! SQL dialect backends.
//!
//! Every supported engine implements [`SqlDialect`]; the engine picks one
//! at runtime through [`DialectRegistry`] by its identifier string.
//! Dialects carry no state, so a single instance is shared by every
//! operation that targets the engine.

mod mssql;
mod mysql;
mod postgres;
mod sqlite;

pub use mssql::MsSql;
pub use mysql::MySql;
pub use postgres::Postgres;
pub use sqlite::Sqlite;

use crate::error::{StrataError, StrataResult};
use crate::schema::{ColumnMeta, NormalizedType};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

/// Columns produced by every [`SqlDialect::metadata_query`], in order
pub const METADATA_COLUMNS: &[&str] = &[
    "table_schema",
    "table_name",
    "column_name",
    "data_type",
    "is_primary_key",
    "is_unique",
    "is_nullable",
    "constraint_name",
    "ordinal_position",
    "column_default",
    "is_auto_increment",
    "max_length",
    "numeric_precision",
    "numeric_scale",
    "ref_table_schema",
    "ref_table_name",
    "ref_column_name",
    "delete_rule",
];

/// How a dialect hands back rows touched by a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturningStyle {
    /// `... RETURNING a, b`
    Suffix,
    /// `OUTPUT INSERTED.a` / `OUTPUT DELETED.a` inside the statement
    Output,
    /// No returning support; the executor synthesizes rows
    Unsupported,
}

/// Capability set for one database engine.
pub trait SqlDialect: Send + Sync + Debug {
    /// Identifier used in configuration (`postgres`, `mysql`, ...)
    fn name(&self) -> &'static str;

    /// Append (or splice in) row limiting.
    ///
    /// `limit <= 0` is replaced by `default_limit`.
    fn build_limit_offset(&self, query: &str, limit: i64, skip: i64, default_limit: i64)
        -> String;

    /// Placeholder list for a `rows x cols` parameter batch.
    ///
    /// With `single_row` exactly one marker is produced, numbered by
    /// `col_count` for dialects with numbered markers.
    fn placeholder_list(&self, row_count: usize, col_count: usize, single_row: bool) -> String;

    /// Marker for the 1-based parameter `n`
    fn placeholder(&self, n: usize) -> String {
        self.placeholder_list(1, n, true)
    }

    /// Introspection statement returning [`METADATA_COLUMNS`]
    fn metadata_query(&self) -> &'static str;

    /// Statement returning the schema whose tables are keyed by bare name
    fn default_schema_query(&self) -> &'static str;

    /// Liveness probe run when a connection is opened
    fn probe_query(&self) -> &'static str {
        "SELECT 1"
    }

    fn map_native_type(&self, native_type: &str) -> NormalizedType;

    /// Inverse of [`map_native_type`](Self::map_native_type) for DDL
    fn native_type_for(&self, normalized: NormalizedType) -> Option<&'static str>;

    fn build_create_table(&self, table: &str, _columns: &[ColumnMeta]) -> StrataResult<String> {
        Err(StrataError::NotImplemented(format!(
            "create table `{}` for dialect {}",
            table,
            self.name()
        )))
    }

    fn build_drop_table(&self, table: &str) -> StrataResult<String> {
        Err(StrataError::NotImplemented(format!(
            "drop table `{}` for dialect {}",
            table,
            self.name()
        )))
    }

    fn returning_style(&self) -> ReturningStyle {
        ReturningStyle::Suffix
    }

    /// Quote a column alias in the select list
    fn quote_alias(&self, alias: &str) -> String {
        format!("\"{}\"", alias)
    }

    fn bool_literal(&self, value: bool) -> &'static str {
        if value {
            "true"
        } else {
            "false"
        }
    }

    fn begin_statement(&self) -> &'static str {
        "BEGIN"
    }

    fn commit_statement(&self) -> &'static str {
        "COMMIT"
    }

    fn rollback_statement(&self) -> &'static str {
        "ROLLBACK"
    }
}

/// Registry of dialects keyed by identifier.
pub struct DialectRegistry {
    dialects: HashMap<String, Arc<dyn SqlDialect>>,
}

impl Default for DialectRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl DialectRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            dialects: HashMap::new(),
        }
    }

    /// Registry with the four built-in dialects
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(Postgres));
        registry.register(Arc::new(MySql));
        registry.register(Arc::new(MsSql));
        registry.register(Arc::new(Sqlite));
        registry
    }

    /// Add or replace a dialect under its own name
    pub fn register(&mut self, dialect: Arc<dyn SqlDialect>) {
        self.dialects.insert(dialect.name().to_string(), dialect);
    }

    pub fn get(&self, name: &str) -> StrataResult<Arc<dyn SqlDialect>> {
        self.dialects
            .get(name)
            .cloned()
            .ok_or_else(|| StrataError::invalid(format!("unknown dialect `{}`", name)))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.dialects.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

pub(crate) fn effective_limit(limit: i64, default_limit: i64) -> i64 {
    if limit <= 0 {
        default_limit
    } else {
        limit
    }
}

/// `($1, $2), ($3, $4)` allocated row-major
pub(crate) fn numbered_placeholders(
    prefix: &str,
    row_count: usize,
    col_count: usize,
    single_row: bool,
) -> String {
    if single_row {
        return format!("{}{}", prefix, col_count);
    }
    (0..row_count)
        .map(|row| {
            let markers: Vec<String> = (1..=col_count)
                .map(|col| format!("{}{}", prefix, row * col_count + col))
                .collect();
            format!("({})", markers.join(", "))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// `(?, ?), (?, ?)`
pub(crate) fn repeated_placeholders(
    marker: &str,
    row_count: usize,
    col_count: usize,
    single_row: bool,
) -> String {
    if single_row {
        return marker.to_string();
    }
    let row = format!("({})", vec![marker; col_count].join(", "));
    vec![row; row_count].join(", ")
}

/// Lowercased type name without length/precision facets
pub(crate) fn base_type_name(native_type: &str) -> String {
    let name = native_type.split('(').next().unwrap_or(native_type);
    name.trim().to_ascii_lowercase()
}

/// Whether the statement already carries an ORDER BY outside quoted text
pub(crate) fn has_order_by(query: &str) -> bool {
    let mut bare = String::with_capacity(query.len());
    let mut quote: Option<char> = None;
    for c in query.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => {
                quote = None;
                bare.push(' ');
            }
            (Some(_), _) => bare.push(' '),
            (None, '\'' | '"' | '[') => {
                quote = Some(if c == '[' { ']' } else { c });
                bare.push(' ');
            }
            (None, c) => bare.push(c.to_ascii_uppercase()),
        }
    }
    bare.split_whitespace().collect::<Vec<_>>().join(" ").contains(" ORDER BY ")
}

/// Shared `CREATE TABLE` builder; `auto_increment` is the column suffix for
/// generated keys.
pub(crate) fn create_table_sql(
    dialect: &dyn SqlDialect,
    table: &str,
    columns: &[ColumnMeta],
    auto_increment: &str,
) -> StrataResult<String> {
    crate::ident::ensure_identifier("table", table)?;
    if columns.is_empty() {
        return Err(StrataError::invalid(format!(
            "table `{}` needs at least one column",
            table
        )));
    }

    let mut ordered: Vec<&ColumnMeta> = columns.iter().collect();
    ordered.sort_by_key(|c| c.ordinal_position);

    let pk: Vec<&str> = ordered
        .iter()
        .filter(|c| c.is_primary_key)
        .map(|c| c.column_name.as_str())
        .collect();

    let mut defs = Vec::with_capacity(ordered.len() + 1);
    for column in &ordered {
        crate::ident::ensure_identifier("column", &column.column_name)?;
        let native = dialect.native_type_for(column.normalized_type).ok_or_else(|| {
            StrataError::NotImplemented(format!(
                "type {} for dialect {}",
                column.normalized_type,
                dialect.name()
            ))
        })?;

        let mut def = format!("{} {}", column.column_name, native);
        if column.is_auto_increment {
            def.push(' ');
            def.push_str(auto_increment);
        }
        if !column.is_nullable && !column.is_primary_key {
            def.push_str(" NOT NULL");
        }
        if column.is_unique && !column.is_primary_key {
            def.push_str(" UNIQUE");
        }
        if let Some(fk) = &column.foreign_key {
            def.push_str(&format!(" REFERENCES {}({})", fk.table_name, fk.column_name));
        }
        defs.push(def);
    }
    if !pk.is_empty() {
        defs.push(format!("PRIMARY KEY ({})", pk.join(", ")));
    }

    Ok(format!("CREATE TABLE {} ({})", table, defs.join(", ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    const QUERY: &str = "SELECT users.id AS \"L0~~0**id\" FROM users";

    #[test_case("postgres", 10, 5 => format!("{} LIMIT 10 OFFSET 5", QUERY); "postgres paged")]
    #[test_case("postgres", 10, 0 => format!("{} LIMIT 10", QUERY); "postgres first page")]
    #[test_case("mysql", 10, 5 => format!("{} LIMIT 5, 10", QUERY); "mysql paged")]
    #[test_case("mysql", 10, 0 => format!("{} LIMIT 10", QUERY); "mysql first page")]
    #[test_case("mssql", 10, 5 => format!("{} ORDER BY (SELECT NULL) OFFSET 5 ROWS FETCH NEXT 10 ROWS ONLY", QUERY); "mssql paged")]
    #[test_case("mssql", 10, 0 => "SELECT TOP 10 users.id AS \"L0~~0**id\" FROM users".to_string(); "mssql first page")]
    #[test_case("sqlite", 10, 5 => format!("{} LIMIT 10 OFFSET 5", QUERY); "sqlite paged")]
    fn test_limit_offset_forms(dialect: &str, limit: i64, skip: i64) -> String {
        let registry = DialectRegistry::with_defaults();
        registry
            .get(dialect)
            .unwrap()
            .build_limit_offset(QUERY, limit, skip, 1000)
    }

    #[test_case("postgres"; "postgres")]
    #[test_case("mysql"; "mysql")]
    #[test_case("mssql"; "mssql")]
    #[test_case("sqlite"; "sqlite")]
    fn test_non_positive_limit_uses_default(dialect: &str) {
        let dialect = DialectRegistry::with_defaults().get(dialect).unwrap();
        let sql = dialect.build_limit_offset(QUERY, 0, 0, 250);
        assert!(sql.contains("250"), "{}", sql);
        let sql = dialect.build_limit_offset(QUERY, -3, 0, 250);
        assert!(sql.contains("250"), "{}", sql);
    }

    #[test]
    fn test_mssql_keeps_existing_order_by() {
        let sql = MsSql.build_limit_offset("SELECT a FROM t ORDER BY t.a DESC", 10, 5, 1000);
        assert_eq!(
            sql,
            "SELECT a FROM t ORDER BY t.a DESC OFFSET 5 ROWS FETCH NEXT 10 ROWS ONLY"
        );
    }

    #[test]
    fn test_mssql_ignores_order_by_inside_literals() {
        let sql = MsSql.build_limit_offset("SELECT a FROM t WHERE t.note = 'x order by y'", 10, 5, 1000);
        assert_eq!(
            sql,
            "SELECT a FROM t WHERE t.note = 'x order by y' ORDER BY (SELECT NULL) OFFSET 5 ROWS FETCH NEXT 10 ROWS ONLY"
        );
        assert!(has_order_by("SELECT a FROM t WHERE t.note = 'it''s' ORDER BY t.a"));
        assert!(!has_order_by("SELECT \"L0~~0** order by \" FROM t"));
    }

    #[test]
    fn test_mssql_top_after_distinct() {
        let sql = MsSql.build_limit_offset("SELECT DISTINCT a FROM t", 3, 0, 1000);
        assert_eq!(sql, "SELECT DISTINCT TOP 3 a FROM t");
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(Postgres.placeholder_list(2, 2, false), "($1, $2), ($3, $4)");
        assert_eq!(Postgres.placeholder_list(1, 3, true), "$3");
        assert_eq!(MySql.placeholder_list(2, 2, false), "(?, ?), (?, ?)");
        assert_eq!(MySql.placeholder_list(1, 3, true), "?");
        assert_eq!(Sqlite.placeholder(4), "?");
        assert_eq!(Postgres.placeholder(4), "$4");
    }

    #[test]
    fn test_unknown_dialect() {
        let registry = DialectRegistry::with_defaults();
        assert!(registry.get("oracle").is_err());
        assert_eq!(registry.names(), vec!["mssql", "mysql", "postgres", "sqlite"]);
    }

    #[test]
    fn test_ddl_defaults_to_not_implemented() {
        assert!(matches!(
            MsSql.build_create_table("t", &[]),
            Err(StrataError::NotImplemented(_))
        ));
        assert!(matches!(
            MsSql.build_drop_table("t"),
            Err(StrataError::NotImplemented(_))
        ));
    }

    #[test]
    fn test_base_type_name() {
        assert_eq!(base_type_name("VARCHAR(255)"), "varchar");
        assert_eq!(base_type_name(" numeric(10,2)"), "numeric");
    }
}
