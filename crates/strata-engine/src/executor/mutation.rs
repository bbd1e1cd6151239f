//! Write path: run a mutation plan parent-first.
//!
//! Each child node receives its parent's returned key columns before it
//! runs. Without an open transaction a failing child is recorded and its
//! payload replaced by `{}`; inside a transaction any failure rolls back and
//! aborts the whole plan.

use crate::session::Session;
use serde_json::{Map, Value};
use strata_core::dialect::ReturningStyle;
use strata_core::mutation::WriteNode;
use strata_core::{MutationKind, MutationPlan, ResultSet, StrataError, StrataResult};
use tracing::{debug, info, warn};

type Row = Map<String, Value>;

/// Transaction flags for one mutation operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxnOptions {
    /// Open the request-wide transaction before running
    pub open_txn: bool,
    /// Commit the request-wide transaction afterwards
    pub close_txn: bool,
    /// The field asked for its own transaction (`txn: true`)
    pub txn: bool,
    pub single_txn: bool,
}

impl TxnOptions {
    fn opens(&self) -> bool {
        self.open_txn || (self.txn && !self.single_txn)
    }

    fn closes(&self) -> bool {
        self.close_txn || (self.txn && !self.single_txn)
    }
}

/// Rows handed back by a mutation plus failures of nested writes
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MutationOutcome {
    pub rows: Vec<Value>,
    /// Child failures that did not abort the plan
    pub errors: Vec<StrataError>,
}

impl MutationOutcome {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

pub async fn execute_plan(
    session: &mut Session,
    plan: &MutationPlan,
    options: TxnOptions,
) -> StrataResult<MutationOutcome> {
    if options.opens() && !session.in_transaction() {
        session.begin().await?;
    }

    match run_nodes(session, plan).await {
        Ok(outcome) => {
            if options.closes() {
                session.commit(1).await?;
            }
            info!(
                table = %plan.table,
                kind = %plan.kind,
                rows = outcome.rows.len(),
                failed_children = outcome.errors.len(),
                "Mutation executed"
            );
            Ok(outcome)
        }
        Err(e) => {
            if session.in_transaction() {
                let _ = session.rollback().await;
            }
            Err(e)
        }
    }
}

async fn run_nodes(session: &mut Session, plan: &MutationPlan) -> StrataResult<MutationOutcome> {
    let mut results: Vec<Option<Vec<Row>>> = vec![None; plan.nodes.len()];
    let mut errors = Vec::new();

    for id in plan.execution_order() {
        let mut node = plan.nodes[id].clone();
        let ready = match node.parent.clone() {
            None => Ok(true),
            Some(link) => match &results[link.node] {
                // parent failed; nothing to attach to
                None => Ok(false),
                Some(rows) => match rows.get(link.row) {
                    Some(row) => {
                        node.inject(row);
                        Ok(true)
                    }
                    None if node.injected.is_empty() => Ok(true),
                    None => Err(StrataError::db(
                        node.document,
                        format!(
                            "`{}` returned no row {} to link `{}` to",
                            plan.nodes[link.node].table,
                            link.row + 1,
                            node.table
                        ),
                    )),
                },
            },
        };

        let outcome = match ready {
            Ok(false) => continue,
            Ok(true) => run_node(session, &node).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(rows) => results[id] = Some(rows),
            Err(e) if node.parent.is_none() || session.in_transaction() => return Err(e),
            Err(e) => {
                warn!(table = %node.table, document = node.document, error = %e, "Nested write failed");
                errors.push(e);
            }
        }
    }

    let mut rows = Vec::new();
    for &root in &plan.roots {
        for mut row in build(plan, root, &mut results).unwrap_or_default() {
            plan.projection.apply(&mut row);
            rows.push(Value::Object(row));
        }
    }
    Ok(MutationOutcome { rows, errors })
}

async fn run_node(session: &mut Session, node: &WriteNode) -> StrataResult<Vec<Row>> {
    let params = node.params();
    let style = session.dialect().returning_style();
    debug!(table = %node.table, kind = %node.kind, params = params.len(), "Running write");

    match style {
        ReturningStyle::Unsupported => {
            let result = session.execute(&node.sql, &params, node.document).await?;
            Ok(synthesize(node, &result))
        }
        ReturningStyle::Suffix | ReturningStyle::Output => {
            let result = session.query(&node.sql, &params, node.document).await?;
            Ok((0..result.rows.len()).map(|i| result.row_object(i)).collect())
        }
    }
}

/// Rows for engines without RETURNING.
///
/// Inserts echo the bound values and number the generated key from the
/// first inserted id; other writes report the affected row count.
fn synthesize(node: &WriteNode, result: &ResultSet) -> Vec<Row> {
    match node.kind {
        MutationKind::Insert => node
            .rows
            .iter()
            .enumerate()
            .map(|(i, values)| {
                let mut row: Row = node.columns.iter().cloned().zip(values.iter().cloned()).collect();
                if let (Some(key), Some(first)) = (&node.generated_key, result.last_insert_id) {
                    let supplied = row.get(key).is_some_and(|v| !v.is_null());
                    if !supplied {
                        row.insert(key.clone(), Value::from(first + i as i64));
                    }
                }
                row
            })
            .collect(),
        _ => {
            let mut row = Row::new();
            row.insert("affected_rows".to_string(), Value::from(result.rows_affected));
            vec![row]
        }
    }
}

/// Nest each child's rows under its parent row
fn build(plan: &MutationPlan, id: usize, results: &mut [Option<Vec<Row>>]) -> Option<Vec<Row>> {
    let mut rows = results[id].take()?;
    for &child in &plan.nodes[id].children {
        let Some(link) = plan.nodes[child].parent.as_ref() else {
            continue;
        };
        let payload: Vec<Value> = match build(plan, child, results) {
            Some(child_rows) => child_rows.into_iter().map(Value::Object).collect(),
            None => vec![Value::Object(Row::new())],
        };
        if let Some(row) = rows.get_mut(link.row) {
            match row
                .entry(link.key.clone())
                .or_insert_with(|| Value::Array(Vec::new()))
            {
                Value::Array(items) => items.extend(payload),
                other => *other = Value::Array(payload),
            }
        }
    }
    Some(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strata_core::mutation::{ParentLink, Projection};

    fn node(kind: MutationKind) -> WriteNode {
        WriteNode {
            table: "users".to_string(),
            kind,
            columns: vec!["name".to_string()],
            rows: vec![vec![json!("a")], vec![json!("b")]],
            injected: Vec::new(),
            parent: None,
            children: Vec::new(),
            document: 1,
            filter: None,
            returning: Vec::new(),
            generated_key: Some("id".to_string()),
            projection: Projection::default(),
            sql: String::new(),
        }
    }

    #[test]
    fn test_synthesized_insert_numbers_generated_keys() {
        let result = ResultSet {
            rows_affected: 2,
            last_insert_id: Some(7),
            ..Default::default()
        };
        let rows = synthesize(&node(MutationKind::Insert), &result);
        assert_eq!(
            rows.into_iter().map(Value::Object).collect::<Vec<_>>(),
            vec![json!({"name": "a", "id": 7}), json!({"name": "b", "id": 8})]
        );
    }

    #[test]
    fn test_synthesized_update_reports_affected_rows() {
        let result = ResultSet {
            rows_affected: 3,
            ..Default::default()
        };
        let rows = synthesize(&node(MutationKind::Update), &result);
        assert_eq!(Value::Object(rows[0].clone()), json!({"affected_rows": 3}));
    }

    #[test]
    fn test_failed_child_becomes_empty_object() {
        let mut parent = node(MutationKind::Insert);
        parent.children = vec![1, 2];
        let mut ok_child = node(MutationKind::Insert);
        ok_child.table = "orders".to_string();
        ok_child.parent = Some(ParentLink {
            node: 0,
            row: 0,
            key: "orders".to_string(),
        });
        let failed_child = ok_child.clone();

        let plan = MutationPlan {
            kind: MutationKind::Insert,
            table: "users".to_string(),
            nodes: vec![parent, ok_child, failed_child],
            roots: vec![0],
            projection: Projection::default(),
        };
        let mut results = vec![
            Some(vec![json!({"id": 1}).as_object().cloned().unwrap()]),
            Some(vec![json!({"id": 10}).as_object().cloned().unwrap()]),
            None,
        ];

        let rows = build(&plan, 0, &mut results).unwrap();
        assert_eq!(
            Value::Object(rows[0].clone()),
            json!({"id": 1, "orders": [{"id": 10}, {}]})
        );
    }

    #[test]
    fn test_txn_flags() {
        let own = TxnOptions {
            txn: true,
            ..Default::default()
        };
        assert!(own.opens() && own.closes());

        let shared = TxnOptions {
            txn: true,
            single_txn: true,
            ..Default::default()
        };
        assert!(!shared.opens() && !shared.closes());

        let first = TxnOptions {
            open_txn: true,
            single_txn: true,
            ..Default::default()
        };
        assert!(first.opens() && !first.closes());
    }
}
