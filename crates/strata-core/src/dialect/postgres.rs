use super::{
    base_type_name, create_table_sql, effective_limit, numbered_placeholders, SqlDialect,
};
use crate::error::StrataResult;
use crate::schema::{ColumnMeta, NormalizedType};

const METADATA_QUERY: &str = r#"
SELECT
    c.table_schema::text AS table_schema,
    c.table_name::text AS table_name,
    c.column_name::text AS column_name,
    c.data_type::text AS data_type,
    (pk.column_name IS NOT NULL) AS is_primary_key,
    (pk.column_name IS NOT NULL OR uq.column_name IS NOT NULL) AS is_unique,
    (c.is_nullable = 'YES') AS is_nullable,
    fk.constraint_name::text AS constraint_name,
    c.ordinal_position::bigint AS ordinal_position,
    c.column_default::text AS column_default,
    (COALESCE(c.column_default, '') LIKE 'nextval(%' OR c.is_identity = 'YES') AS is_auto_increment,
    c.character_maximum_length::bigint AS max_length,
    c.numeric_precision::bigint AS numeric_precision,
    c.numeric_scale::bigint AS numeric_scale,
    fk.ref_table_schema::text AS ref_table_schema,
    fk.ref_table_name::text AS ref_table_name,
    fk.ref_column_name::text AS ref_column_name,
    fk.delete_rule::text AS delete_rule
FROM information_schema.columns c
JOIN information_schema.tables t
    ON t.table_schema = c.table_schema
    AND t.table_name = c.table_name
    AND t.table_type = 'BASE TABLE'
LEFT JOIN (
    SELECT DISTINCT kcu.table_schema, kcu.table_name, kcu.column_name
    FROM information_schema.table_constraints tc
    JOIN information_schema.key_column_usage kcu
        ON kcu.constraint_name = tc.constraint_name
        AND kcu.constraint_schema = tc.constraint_schema
    WHERE tc.constraint_type = 'PRIMARY KEY'
) pk ON pk.table_schema = c.table_schema AND pk.table_name = c.table_name AND pk.column_name = c.column_name
LEFT JOIN (
    SELECT DISTINCT kcu.table_schema, kcu.table_name, kcu.column_name
    FROM information_schema.table_constraints tc
    JOIN information_schema.key_column_usage kcu
        ON kcu.constraint_name = tc.constraint_name
        AND kcu.constraint_schema = tc.constraint_schema
    WHERE tc.constraint_type = 'UNIQUE'
) uq ON uq.table_schema = c.table_schema AND uq.table_name = c.table_name AND uq.column_name = c.column_name
LEFT JOIN (
    SELECT
        kcu.table_schema, kcu.table_name, kcu.column_name, kcu.constraint_name,
        rku.table_schema AS ref_table_schema,
        rku.table_name AS ref_table_name,
        rku.column_name AS ref_column_name,
        rc.delete_rule
    FROM information_schema.referential_constraints rc
    JOIN information_schema.key_column_usage kcu
        ON kcu.constraint_name = rc.constraint_name
        AND kcu.constraint_schema = rc.constraint_schema
    JOIN information_schema.key_column_usage rku
        ON rku.constraint_name = rc.unique_constraint_name
        AND rku.constraint_schema = rc.unique_constraint_schema
        AND rku.ordinal_position = kcu.position_in_unique_constraint
) fk ON fk.table_schema = c.table_schema AND fk.table_name = c.table_name AND fk.column_name = c.column_name
WHERE c.table_schema NOT IN ('pg_catalog', 'information_schema')
ORDER BY c.table_schema, c.table_name, c.ordinal_position
"#;

/// PostgreSQL: numbered `$n` markers, `LIMIT n OFFSET m`, `RETURNING`
#[derive(Debug, Clone, Copy, Default)]
pub struct Postgres;

impl SqlDialect for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
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
        numbered_placeholders("$", row_count, col_count, single_row)
    }

    fn metadata_query(&self) -> &'static str {
        METADATA_QUERY
    }

    fn default_schema_query(&self) -> &'static str {
        "SELECT current_schema()::text"
    }

    fn map_native_type(&self, native_type: &str) -> NormalizedType {
        match base_type_name(native_type).as_str() {
            "smallint" | "integer" | "bigint" | "int" | "int2" | "int4" | "int8" | "serial"
            | "bigserial" | "smallserial" => NormalizedType::Integer,
            "real" | "double precision" | "float4" | "float8" => NormalizedType::Float,
            "numeric" | "decimal" | "money" => NormalizedType::Decimal,
            "text" | "character varying" | "varchar" | "character" | "char" | "bpchar"
            | "citext" | "name" => NormalizedType::String,
            "boolean" | "bool" => NormalizedType::Boolean,
            "date" => NormalizedType::Date,
            "timestamp" | "timestamp without time zone" | "timestamp with time zone"
            | "timestamptz" => NormalizedType::DateTime,
            "time" | "time without time zone" | "time with time zone" | "timetz" => {
                NormalizedType::Time
            }
            "json" | "jsonb" => NormalizedType::Json,
            "uuid" => NormalizedType::Uuid,
            "bytea" => NormalizedType::Binary,
            _ => NormalizedType::NotSupported,
        }
    }

    fn native_type_for(&self, normalized: NormalizedType) -> Option<&'static str> {
        match normalized {
            NormalizedType::Integer => Some("bigint"),
            NormalizedType::Float => Some("double precision"),
            NormalizedType::Decimal => Some("numeric"),
            NormalizedType::String => Some("text"),
            NormalizedType::Boolean => Some("boolean"),
            NormalizedType::Date => Some("date"),
            NormalizedType::DateTime => Some("timestamptz"),
            NormalizedType::Time => Some("time"),
            NormalizedType::Json => Some("jsonb"),
            NormalizedType::Uuid => Some("uuid"),
            NormalizedType::Binary => Some("bytea"),
            NormalizedType::NotSupported => None,
        }
    }

    fn build_create_table(&self, table: &str, columns: &[ColumnMeta]) -> StrataResult<String> {
        create_table_sql(self, table, columns, "GENERATED BY DEFAULT AS IDENTITY")
    }

    fn build_drop_table(&self, table: &str) -> StrataResult<String> {
        crate::ident::ensure_identifier("table", table)?;
        Ok(format!("DROP TABLE IF EXISTS {}", table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_mapping() {
        assert_eq!(Postgres.map_native_type("integer"), NormalizedType::Integer);
        assert_eq!(
            Postgres.map_native_type("character varying(64)"),
            NormalizedType::String
        );
        assert_eq!(Postgres.map_native_type("jsonb"), NormalizedType::Json);
        assert_eq!(Postgres.map_native_type("tsvector"), NormalizedType::NotSupported);
    }

    #[test]
    fn test_create_table() {
        let columns = vec![
            ColumnMeta::new("users", "id", NormalizedType::Integer)
                .primary_key()
                .auto_increment(),
            ColumnMeta {
                ordinal_position: 1,
                is_nullable: false,
                ..ColumnMeta::new("users", "name", NormalizedType::String)
            },
        ];
        let sql = Postgres.build_create_table("users", &columns).unwrap();
        assert_eq!(
            sql,
            "CREATE TABLE users (id bigint GENERATED BY DEFAULT AS IDENTITY, name text NOT NULL, PRIMARY KEY (id))"
        );
        assert_eq!(
            Postgres.build_drop_table("users").unwrap(),
            "DROP TABLE IF EXISTS users"
        );
    }

    #[test]
    fn test_metadata_query_excludes_system_schemas() {
        assert!(Postgres.metadata_query().contains("'pg_catalog', 'information_schema'"));
    }
}
