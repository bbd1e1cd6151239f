//! Read path: run a compiled query and fold its rows

use crate::session::Session;
use serde_json::Value;
use strata_core::assemble::{assemble_csv, assemble_rows};
use strata_core::rules::Rules;
use strata_core::{CompiledQuery, SchemaRegistry, StrataError, StrataResult};
use tracing::debug;

/// Run `query` and return the rows the caller asked for.
///
/// CSV queries come back as a header row followed by string rows.
pub async fn run_query(
    session: &mut Session,
    query: &CompiledQuery,
    schema: &SchemaRegistry,
    rules: &Rules,
) -> StrataResult<Vec<Value>> {
    let result = session.query(&query.sql, &[], 1).await?;
    debug!(table = %query.main_table, rows = result.rows.len(), "Query returned");

    if query.csv {
        return Ok(assemble_csv(&result)
            .into_iter()
            .map(|row| Value::Array(row.into_iter().map(Value::String).collect()))
            .collect());
    }

    let rows = assemble_rows(&result, &query.tables);
    rules
        .transform
        .transform_output(
            &query.main_table,
            schema.transform_rules.get(&query.main_table),
            rows,
        )
        .map_err(|e| match e {
            StrataError::RuleFailure { .. } => e,
            other => StrataError::RuleFailure {
                source_name: "transform".to_string(),
                message: other.to_string(),
            },
        })
}

/// Run a raw statement with bound parameters
pub async fn run_raw(session: &mut Session, sql: &str, params: &[Value]) -> StrataResult<Vec<Value>> {
    let result = session.query(sql, params, 1).await?;
    if result.columns.is_empty() {
        return Ok(vec![serde_json::json!({ "affected_rows": result.rows_affected })]);
    }
    Ok(result.to_objects())
}
