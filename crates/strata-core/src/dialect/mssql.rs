use super::{
    base_type_name, effective_limit, has_order_by, repeated_placeholders, ReturningStyle,
    SqlDialect,
};
use crate::schema::NormalizedType;

const METADATA_QUERY: &str = r#"
SELECT
    c.TABLE_SCHEMA AS table_schema,
    c.TABLE_NAME AS table_name,
    c.COLUMN_NAME AS column_name,
    c.DATA_TYPE AS data_type,
    CAST(CASE WHEN pk.COLUMN_NAME IS NOT NULL THEN 1 ELSE 0 END AS bit) AS is_primary_key,
    CAST(CASE WHEN pk.COLUMN_NAME IS NOT NULL OR uq.COLUMN_NAME IS NOT NULL THEN 1 ELSE 0 END AS bit) AS is_unique,
    CAST(CASE WHEN c.IS_NULLABLE = 'YES' THEN 1 ELSE 0 END AS bit) AS is_nullable,
    fk.constraint_name AS constraint_name,
    CAST(c.ORDINAL_POSITION AS bigint) AS ordinal_position,
    c.COLUMN_DEFAULT AS column_default,
    CAST(COALESCE(COLUMNPROPERTY(OBJECT_ID(QUOTENAME(c.TABLE_SCHEMA) + '.' + QUOTENAME(c.TABLE_NAME)), c.COLUMN_NAME, 'IsIdentity'), 0) AS bit) AS is_auto_increment,
    CAST(c.CHARACTER_MAXIMUM_LENGTH AS bigint) AS max_length,
    CAST(c.NUMERIC_PRECISION AS bigint) AS numeric_precision,
    CAST(c.NUMERIC_SCALE AS bigint) AS numeric_scale,
    fk.ref_table_schema AS ref_table_schema,
    fk.ref_table_name AS ref_table_name,
    fk.ref_column_name AS ref_column_name,
    fk.delete_rule AS delete_rule
FROM INFORMATION_SCHEMA.COLUMNS c
JOIN INFORMATION_SCHEMA.TABLES t
    ON t.TABLE_SCHEMA = c.TABLE_SCHEMA
    AND t.TABLE_NAME = c.TABLE_NAME
    AND t.TABLE_TYPE = 'BASE TABLE'
LEFT JOIN (
    SELECT DISTINCT ku.TABLE_SCHEMA, ku.TABLE_NAME, ku.COLUMN_NAME
    FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
    JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE ku
        ON ku.CONSTRAINT_NAME = tc.CONSTRAINT_NAME
        AND ku.CONSTRAINT_SCHEMA = tc.CONSTRAINT_SCHEMA
    WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY'
) pk ON pk.TABLE_SCHEMA = c.TABLE_SCHEMA AND pk.TABLE_NAME = c.TABLE_NAME AND pk.COLUMN_NAME = c.COLUMN_NAME
LEFT JOIN (
    SELECT DISTINCT ku.TABLE_SCHEMA, ku.TABLE_NAME, ku.COLUMN_NAME
    FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
    JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE ku
        ON ku.CONSTRAINT_NAME = tc.CONSTRAINT_NAME
        AND ku.CONSTRAINT_SCHEMA = tc.CONSTRAINT_SCHEMA
    WHERE tc.CONSTRAINT_TYPE = 'UNIQUE'
) uq ON uq.TABLE_SCHEMA = c.TABLE_SCHEMA AND uq.TABLE_NAME = c.TABLE_NAME AND uq.COLUMN_NAME = c.COLUMN_NAME
LEFT JOIN (
    SELECT
        f.name AS constraint_name,
        SCHEMA_NAME(p.schema_id) AS table_schema,
        p.name AS table_name,
        pc.name AS column_name,
        SCHEMA_NAME(r.schema_id) AS ref_table_schema,
        r.name AS ref_table_name,
        rc.name AS ref_column_name,
        f.delete_referential_action_desc AS delete_rule
    FROM sys.foreign_keys f
    JOIN sys.foreign_key_columns fkc ON fkc.constraint_object_id = f.object_id
    JOIN sys.tables p ON p.object_id = fkc.parent_object_id
    JOIN sys.columns pc ON pc.object_id = fkc.parent_object_id AND pc.column_id = fkc.parent_column_id
    JOIN sys.tables r ON r.object_id = fkc.referenced_object_id
    JOIN sys.columns rc ON rc.object_id = fkc.referenced_object_id AND rc.column_id = fkc.referenced_column_id
) fk ON fk.table_schema = c.TABLE_SCHEMA AND fk.table_name = c.TABLE_NAME AND fk.column_name = c.COLUMN_NAME
WHERE c.TABLE_SCHEMA NOT IN ('sys', 'INFORMATION_SCHEMA')
ORDER BY c.TABLE_SCHEMA, c.TABLE_NAME, c.ORDINAL_POSITION
"#;

/// SQL Server: `TOP n` or `OFFSET .. FETCH NEXT`, `OUTPUT INSERTED.*`.
///
/// Markers are `?` here; the driver renumbers them to `@P<n>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsSql;

impl MsSql {
    /// Splice `TOP n` after the leading `SELECT [DISTINCT]`
    fn splice_top(query: &str, limit: i64) -> String {
        let trimmed = query.trim_start();
        let upper = trimmed.to_ascii_uppercase();
        for keyword in ["SELECT DISTINCT ", "SELECT "] {
            if upper.starts_with(keyword) {
                let (head, tail) = trimmed.split_at(keyword.len());
                return format!("{}TOP {} {}", head, limit, tail);
            }
        }
        format!("SELECT TOP {} * FROM ({}) AS paged", limit, query)
    }
}

impl SqlDialect for MsSql {
    fn name(&self) -> &'static str {
        "mssql"
    }

    fn build_limit_offset(&self, query: &str, limit: i64, skip: i64, default_limit: i64) -> String {
        let limit = effective_limit(limit, default_limit);
        if skip <= 0 {
            return Self::splice_top(query, limit);
        }

        let order_by = if has_order_by(query) {
            ""
        } else {
            " ORDER BY (SELECT NULL)"
        };
        format!(
            "{}{} OFFSET {} ROWS FETCH NEXT {} ROWS ONLY",
            query, order_by, skip, limit
        )
    }

    fn placeholder_list(&self, row_count: usize, col_count: usize, single_row: bool) -> String {
        repeated_placeholders("?", row_count, col_count, single_row)
    }

    fn metadata_query(&self) -> &'static str {
        METADATA_QUERY
    }

    fn default_schema_query(&self) -> &'static str {
        "SELECT SCHEMA_NAME()"
    }

    fn map_native_type(&self, native_type: &str) -> NormalizedType {
        match base_type_name(native_type).as_str() {
            "tinyint" | "smallint" | "int" | "bigint" => NormalizedType::Integer,
            "float" | "real" => NormalizedType::Float,
            "decimal" | "numeric" | "money" | "smallmoney" => NormalizedType::Decimal,
            "char" | "varchar" | "nchar" | "nvarchar" | "text" | "ntext" | "xml" => {
                NormalizedType::String
            }
            "bit" => NormalizedType::Boolean,
            "date" => NormalizedType::Date,
            "datetime" | "datetime2" | "smalldatetime" | "datetimeoffset" => {
                NormalizedType::DateTime
            }
            "time" => NormalizedType::Time,
            "uniqueidentifier" => NormalizedType::Uuid,
            "binary" | "varbinary" | "image" => NormalizedType::Binary,
            _ => NormalizedType::NotSupported,
        }
    }

    fn native_type_for(&self, normalized: NormalizedType) -> Option<&'static str> {
        match normalized {
            NormalizedType::Integer => Some("bigint"),
            NormalizedType::Float => Some("float"),
            NormalizedType::Decimal => Some("decimal(38,10)"),
            NormalizedType::String => Some("nvarchar(max)"),
            NormalizedType::Boolean => Some("bit"),
            NormalizedType::Date => Some("date"),
            NormalizedType::DateTime => Some("datetime2"),
            NormalizedType::Time => Some("time"),
            NormalizedType::Json => Some("nvarchar(max)"),
            NormalizedType::Uuid => Some("uniqueidentifier"),
            NormalizedType::Binary => Some("varbinary(max)"),
            NormalizedType::NotSupported => None,
        }
    }

    fn returning_style(&self) -> ReturningStyle {
        ReturningStyle::Output
    }

    fn quote_alias(&self, alias: &str) -> String {
        format!("[{}]", alias)
    }

    fn bool_literal(&self, value: bool) -> &'static str {
        if value {
            "1"
        } else {
            "0"
        }
    }

    fn begin_statement(&self) -> &'static str {
        "BEGIN TRANSACTION"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_is_spliced_case_insensitively() {
        assert_eq!(
            MsSql.build_limit_offset("select a from t", 5, 0, 1000),
            "select TOP 5 a from t"
        );
    }

    #[test]
    fn test_type_mapping() {
        assert_eq!(MsSql.map_native_type("nvarchar"), NormalizedType::String);
        assert_eq!(MsSql.map_native_type("uniqueidentifier"), NormalizedType::Uuid);
        assert_eq!(MsSql.map_native_type("bit"), NormalizedType::Boolean);
    }
}
