use super::{create_table_sql, effective_limit, repeated_placeholders, SqlDialect};
use crate::error::StrataResult;
use crate::schema::{ColumnMeta, NormalizedType};

const METADATA_QUERY: &str = r#"
SELECT
    'main' AS table_schema,
    m.name AS table_name,
    p.name AS column_name,
    p.type AS data_type,
    (p.pk > 0) AS is_primary_key,
    (p.pk > 0) AS is_unique,
    (p."notnull" = 0 AND p.pk = 0) AS is_nullable,
    NULL AS constraint_name,
    p.cid + 1 AS ordinal_position,
    p.dflt_value AS column_default,
    (p.pk = 1 AND upper(p.type) = 'INTEGER') AS is_auto_increment,
    NULL AS max_length,
    NULL AS numeric_precision,
    NULL AS numeric_scale,
    CASE WHEN f."table" IS NULL THEN NULL ELSE 'main' END AS ref_table_schema,
    f."table" AS ref_table_name,
    f."to" AS ref_column_name,
    f.on_delete AS delete_rule
FROM sqlite_master m
JOIN pragma_table_info(m.name) p
LEFT JOIN pragma_foreign_key_list(m.name) f ON f."from" = p.name
WHERE m.type = 'table' AND m.name NOT LIKE 'sqlite_%'
ORDER BY m.name, p.cid
"#;

/// SQLite: `?` markers, `LIMIT n OFFSET m`, `RETURNING` (3.35+)
#[derive(Debug, Clone, Copy, Default)]
pub struct Sqlite;

impl SqlDialect for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn build_limit_offset(&self, query: &str, limit: i64, skip: i64, default_limit: i64) -> String {
        let limit = effective_limit(limit, default_limit);
        if skip > 0 {
            format!("{} LIMIT {} OFFSET {}", query, limit, skip)
        } else {
            format!("{} LIMIT {}", query, limit)
        }
    }

    fn placeholder_list(&self, row_count: usize, col_count: usize, single_row: bool) -> String {
        repeated_placeholders("?", row_count, col_count, single_row)
    }

    fn metadata_query(&self) -> &'static str {
        METADATA_QUERY
    }

    fn default_schema_query(&self) -> &'static str {
        "SELECT 'main'"
    }

    /// Declared types follow SQLite's affinity rules
    fn map_native_type(&self, native_type: &str) -> NormalizedType {
        let upper = native_type.to_ascii_uppercase();
        if upper.contains("BOOL") {
            NormalizedType::Boolean
        } else if upper.contains("INT") {
            NormalizedType::Integer
        } else if upper.contains("JSON") {
            NormalizedType::Json
        } else if upper.contains("UUID") {
            NormalizedType::Uuid
        } else if upper.contains("DATETIME") || upper.contains("TIMESTAMP") {
            NormalizedType::DateTime
        } else if upper.contains("DATE") {
            NormalizedType::Date
        } else if upper.contains("TIME") {
            NormalizedType::Time
        } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            NormalizedType::String
        } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            NormalizedType::Float
        } else if upper.contains("NUMERIC") || upper.contains("DECIMAL") {
            NormalizedType::Decimal
        } else if upper.contains("BLOB") || upper.trim().is_empty() {
            NormalizedType::Binary
        } else {
            NormalizedType::NotSupported
        }
    }

    fn native_type_for(&self, normalized: NormalizedType) -> Option<&'static str> {
        match normalized {
            NormalizedType::Integer => Some("INTEGER"),
            NormalizedType::Float => Some("REAL"),
            NormalizedType::Decimal => Some("NUMERIC"),
            NormalizedType::String => Some("TEXT"),
            NormalizedType::Boolean => Some("BOOLEAN"),
            NormalizedType::Date => Some("DATE"),
            NormalizedType::DateTime => Some("DATETIME"),
            NormalizedType::Time => Some("TIME"),
            NormalizedType::Json => Some("JSON"),
            NormalizedType::Uuid => Some("TEXT"),
            NormalizedType::Binary => Some("BLOB"),
            NormalizedType::NotSupported => None,
        }
    }

    fn build_create_table(&self, table: &str, columns: &[ColumnMeta]) -> StrataResult<String> {
        let pk_count = columns.iter().filter(|c| c.is_primary_key).count();
        let auto = columns
            .iter()
            .find(|c| c.is_auto_increment && c.is_primary_key && pk_count == 1);

        // rowid alias must be declared inline as `INTEGER PRIMARY KEY`
        match auto {
            Some(auto) => {
                let rest: Vec<ColumnMeta> = columns
                    .iter()
                    .map(|c| {
                        let mut c = c.clone();
                        if c.column_name == auto.column_name {
                            c.is_primary_key = false;
                            c.is_unique = false;
                            c.is_nullable = true;
                        }
                        c
                    })
                    .collect();
                create_table_sql(self, table, &rest, "PRIMARY KEY AUTOINCREMENT")
            }
            None => create_table_sql(self, table, columns, ""),
        }
    }

    fn build_drop_table(&self, table: &str) -> StrataResult<String> {
        crate::ident::ensure_identifier("table", table)?;
        Ok(format!("DROP TABLE IF EXISTS {}", table))
    }

    fn bool_literal(&self, value: bool) -> &'static str {
        if value {
            "1"
        } else {
            "0"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_affinity_mapping() {
        assert_eq!(Sqlite.map_native_type("INTEGER"), NormalizedType::Integer);
        assert_eq!(Sqlite.map_native_type("varchar(20)"), NormalizedType::String);
        assert_eq!(Sqlite.map_native_type("DOUBLE PRECISION"), NormalizedType::Float);
        assert_eq!(Sqlite.map_native_type("DATETIME"), NormalizedType::DateTime);
        assert_eq!(Sqlite.map_native_type(""), NormalizedType::Binary);
    }

    #[test]
    fn test_create_table_with_rowid_alias() {
        let columns = vec![
            ColumnMeta::new("users", "id", NormalizedType::Integer)
                .primary_key()
                .auto_increment(),
            ColumnMeta {
                ordinal_position: 1,
                ..ColumnMeta::new("users", "name", NormalizedType::String)
            },
        ];
        assert_eq!(
            Sqlite.build_create_table("users", &columns).unwrap(),
            "CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT)"
        );
    }
}
