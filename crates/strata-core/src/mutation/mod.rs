//! Mutation planning.
//!
//! A nested input document becomes a tree of single-table writes held in an
//! arena ([`MutationPlan::nodes`]). Children refer to their parent by index
//! and record which of their columns must be copied from the parent's
//! returned row once the parent has executed.

mod planner;
mod statement;

pub use planner::MutationPlanner;
pub use statement::{delete_sql, insert_select_sql, insert_sql, update_sql};

use crate::request::Field;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Insert,
    Update,
    Delete,
    InsertSelect,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::InsertSelect => "insertselect",
        }
    }

    /// Split `insert_users` into its kind and table part
    pub fn from_field_name(name: &str) -> Option<(Self, &str)> {
        // insertselect_ first: it shares the insert prefix
        [
            Self::InsertSelect,
            Self::Insert,
            Self::Update,
            Self::Delete,
        ]
        .into_iter()
        .find_map(|kind| {
            name.strip_prefix(kind.as_str())
                .and_then(|rest| rest.strip_prefix('_'))
                .filter(|table| !table.is_empty())
                .map(|table| (kind, table))
        })
    }
}

impl std::fmt::Display for MutationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape of the `returning` selection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projection {
    pub fields: Vec<String>,
    pub children: Vec<(String, Projection)>,
}

impl Projection {
    pub fn from_selection(selection: &[Field]) -> Self {
        let mut projection = Self::default();
        for field in selection {
            if field.is_leaf() {
                projection.fields.push(field.name.clone());
            } else {
                projection
                    .children
                    .push((field.name.clone(), Self::from_selection(&field.selection)));
            }
        }
        projection
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.children.is_empty()
    }

    pub fn child(&self, key: &str) -> Projection {
        self.children
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, p)| p.clone())
            .unwrap_or_default()
    }

    /// Keep only requested keys; an empty projection keeps everything
    pub fn apply(&self, row: &mut serde_json::Map<String, Value>) {
        if self.is_empty() {
            return;
        }
        row.retain(|key, _| {
            self.fields.iter().any(|f| f == key) || self.children.iter().any(|(c, _)| c == key)
        });
        for (key, child) in &self.children {
            if let Some(Value::Array(items)) = row.get_mut(key) {
                for item in items {
                    if let Value::Object(object) = item {
                        child.apply(object);
                    }
                }
            }
        }
    }
}

/// Column filled from the parent's returned row before execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectedColumn {
    /// Index into [`WriteNode::columns`]
    pub position: usize,
    pub parent_column: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentLink {
    pub node: usize,
    /// Row of the parent's result this child belongs to
    pub row: usize,
    /// Key the child's rows appear under in the parent's returned object
    pub key: String,
}

/// One planned single-table statement
#[derive(Debug, Clone, PartialEq)]
pub struct WriteNode {
    pub table: String,
    pub kind: MutationKind,
    pub columns: Vec<String>,
    /// Bound values, one vector per row, aligned with `columns`
    pub rows: Vec<Vec<Value>>,
    pub injected: Vec<InjectedColumn>,
    pub parent: Option<ParentLink>,
    pub children: Vec<usize>,
    /// 1-based number of the outermost document this write came from
    pub document: usize,
    pub filter: Option<String>,
    /// Columns requested back from the statement; empty means all
    pub returning: Vec<String>,
    /// Auto-increment key, used when the engine cannot return rows
    pub generated_key: Option<String>,
    pub projection: Projection,
    pub sql: String,
}

impl WriteNode {
    /// Parameters in placeholder order
    pub fn params(&self) -> Vec<Value> {
        self.rows.iter().flatten().cloned().collect()
    }

    /// Copy parent values into the injected positions of every row
    pub fn inject(&mut self, parent_row: &serde_json::Map<String, Value>) {
        for injected in &self.injected {
            let value = parent_row
                .get(&injected.parent_column)
                .cloned()
                .unwrap_or(Value::Null);
            for row in &mut self.rows {
                if let Some(slot) = row.get_mut(injected.position) {
                    *slot = value.clone();
                }
            }
        }
    }
}

/// Arena of writes for one mutation field
#[derive(Debug, Clone, PartialEq)]
pub struct MutationPlan {
    pub kind: MutationKind,
    pub table: String,
    pub nodes: Vec<WriteNode>,
    pub roots: Vec<usize>,
    pub projection: Projection,
}

impl MutationPlan {
    pub fn node(&self, id: usize) -> Option<&WriteNode> {
        self.nodes.get(id)
    }

    /// Depth-first, parent before children
    pub fn execution_order(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<usize> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            order.push(id);
            if let Some(node) = self.nodes.get(id) {
                stack.extend(node.children.iter().rev());
            }
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_from_field_name() {
        assert_eq!(
            MutationKind::from_field_name("insertselect_archive"),
            Some((MutationKind::InsertSelect, "archive"))
        );
        assert_eq!(
            MutationKind::from_field_name("insert_sales__orders"),
            Some((MutationKind::Insert, "sales__orders"))
        );
        assert_eq!(
            MutationKind::from_field_name("delete_users"),
            Some((MutationKind::Delete, "users"))
        );
        assert_eq!(MutationKind::from_field_name("users"), None);
        assert_eq!(MutationKind::from_field_name("update_"), None);
    }

    #[test]
    fn test_projection_keeps_requested_keys() {
        let projection = Projection {
            fields: vec!["id".into()],
            children: vec![(
                "orders".into(),
                Projection {
                    fields: vec!["total".into()],
                    children: vec![],
                },
            )],
        };
        let mut row = json!({"id": 1, "name": "a", "orders": [{"id": 3, "total": 5}]})
            .as_object()
            .cloned()
            .unwrap();
        projection.apply(&mut row);
        assert_eq!(
            Value::Object(row),
            json!({"id": 1, "orders": [{"total": 5}]})
        );
    }
}
