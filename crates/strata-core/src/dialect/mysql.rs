use super::{
    base_type_name, create_table_sql, effective_limit, repeated_placeholders, ReturningStyle,
    SqlDialect,
};
use crate::error::StrataResult;
use crate::schema::{ColumnMeta, NormalizedType};

const METADATA_QUERY: &str = r#"
SELECT
    c.TABLE_SCHEMA AS table_schema,
    c.TABLE_NAME AS table_name,
    c.COLUMN_NAME AS column_name,
    c.DATA_TYPE AS data_type,
    (c.COLUMN_KEY = 'PRI') AS is_primary_key,
    (c.COLUMN_KEY IN ('PRI', 'UNI')) AS is_unique,
    (c.IS_NULLABLE = 'YES') AS is_nullable,
    k.CONSTRAINT_NAME AS constraint_name,
    CAST(c.ORDINAL_POSITION AS SIGNED) AS ordinal_position,
    c.COLUMN_DEFAULT AS column_default,
    (c.EXTRA LIKE '%auto_increment%') AS is_auto_increment,
    CAST(c.CHARACTER_MAXIMUM_LENGTH AS SIGNED) AS max_length,
    CAST(c.NUMERIC_PRECISION AS SIGNED) AS numeric_precision,
    CAST(c.NUMERIC_SCALE AS SIGNED) AS numeric_scale,
    k.REFERENCED_TABLE_SCHEMA AS ref_table_schema,
    k.REFERENCED_TABLE_NAME AS ref_table_name,
    k.REFERENCED_COLUMN_NAME AS ref_column_name,
    r.DELETE_RULE AS delete_rule
FROM information_schema.COLUMNS c
JOIN information_schema.TABLES t
    ON t.TABLE_SCHEMA = c.TABLE_SCHEMA
    AND t.TABLE_NAME = c.TABLE_NAME
    AND t.TABLE_TYPE = 'BASE TABLE'
LEFT JOIN information_schema.KEY_COLUMN_USAGE k
    ON k.TABLE_SCHEMA = c.TABLE_SCHEMA
    AND k.TABLE_NAME = c.TABLE_NAME
    AND k.COLUMN_NAME = c.COLUMN_NAME
    AND k.REFERENCED_TABLE_NAME IS NOT NULL
LEFT JOIN information_schema.REFERENTIAL_CONSTRAINTS r
    ON r.CONSTRAINT_SCHEMA = k.CONSTRAINT_SCHEMA
    AND r.CONSTRAINT_NAME = k.CONSTRAINT_NAME
WHERE c.TABLE_SCHEMA NOT IN ('mysql', 'information_schema', 'performance_schema', 'sys')
ORDER BY c.TABLE_SCHEMA, c.TABLE_NAME, c.ORDINAL_POSITION
"#;

/// MySQL / MariaDB: `?` markers, `LIMIT skip, n`, no returning clause
#[derive(Debug, Clone, Copy, Default)]
pub struct MySql;

impl SqlDialect for MySql {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn build_limit_offset(&self, query: &str, limit: i64, skip: i64, default_limit: i64) -> String {
        let limit = effective_limit(limit, default_limit);
        if skip > 0 {
            format!("{} LIMIT {}, {}", query, skip, limit)
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
        "SELECT DATABASE()"
    }

    fn map_native_type(&self, native_type: &str) -> NormalizedType {
        match base_type_name(native_type).as_str() {
            "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint" | "year" => {
                NormalizedType::Integer
            }
            "float" | "double" | "real" => NormalizedType::Float,
            "decimal" | "numeric" => NormalizedType::Decimal,
            "char" | "varchar" | "tinytext" | "text" | "mediumtext" | "longtext" | "enum"
            | "set" => NormalizedType::String,
            "bit" | "bool" | "boolean" => NormalizedType::Boolean,
            "date" => NormalizedType::Date,
            "datetime" | "timestamp" => NormalizedType::DateTime,
            "time" => NormalizedType::Time,
            "json" => NormalizedType::Json,
            "binary" | "varbinary" | "tinyblob" | "blob" | "mediumblob" | "longblob" => {
                NormalizedType::Binary
            }
            _ => NormalizedType::NotSupported,
        }
    }

    fn native_type_for(&self, normalized: NormalizedType) -> Option<&'static str> {
        match normalized {
            NormalizedType::Integer => Some("BIGINT"),
            NormalizedType::Float => Some("DOUBLE"),
            NormalizedType::Decimal => Some("DECIMAL(38,10)"),
            NormalizedType::String => Some("VARCHAR(255)"),
            NormalizedType::Boolean => Some("BOOLEAN"),
            NormalizedType::Date => Some("DATE"),
            NormalizedType::DateTime => Some("DATETIME"),
            NormalizedType::Time => Some("TIME"),
            NormalizedType::Json => Some("JSON"),
            NormalizedType::Uuid => Some("CHAR(36)"),
            NormalizedType::Binary => Some("BLOB"),
            NormalizedType::NotSupported => None,
        }
    }

    fn build_create_table(&self, table: &str, columns: &[ColumnMeta]) -> StrataResult<String> {
        create_table_sql(self, table, columns, "AUTO_INCREMENT")
    }

    fn build_drop_table(&self, table: &str) -> StrataResult<String> {
        crate::ident::ensure_identifier("table", table)?;
        Ok(format!("DROP TABLE IF EXISTS {}", table))
    }

    fn returning_style(&self) -> ReturningStyle {
        ReturningStyle::Unsupported
    }

    fn quote_alias(&self, alias: &str) -> String {
        format!("`{}`", alias)
    }

    fn begin_statement(&self) -> &'static str {
        "START TRANSACTION"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_mapping() {
        assert_eq!(MySql.map_native_type("varchar"), NormalizedType::String);
        assert_eq!(MySql.map_native_type("decimal(10,2)"), NormalizedType::Decimal);
        assert_eq!(MySql.map_native_type("geometry"), NormalizedType::NotSupported);
    }

    #[test]
    fn test_alias_quoting() {
        assert_eq!(MySql.quote_alias("L0~~0**id"), "`L0~~0**id`");
    }
}
