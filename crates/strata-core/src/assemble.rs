//! Fold flat joined rows back into the requested nesting.
//!
//! Every row carries the columns of all joined tables. For each table slot
//! the slice of a row belonging to it is fingerprinted; equal slices under
//! the same parent object collapse into one node, so a parent with three
//! child rows appears once with a three-element array.

use crate::compile::{decode_alias, strip_alias, SlotEntry, TableRegistry};
use crate::value::{coerce_cell, value_to_csv_string, Cell, ResultSet};
use serde_json::{Map, Value};
use std::collections::HashMap;

type Slot = (usize, usize);

#[derive(Debug)]
struct Node {
    slot: Slot,
    fields: Map<String, Value>,
    children: HashMap<usize, Vec<usize>>,
}

#[derive(Default)]
struct Arena {
    nodes: Vec<Node>,
    index: HashMap<(Slot, Option<usize>, String), usize>,
}

impl Arena {
    fn node(
        &mut self,
        slot: Slot,
        parent: Option<usize>,
        fields: Map<String, Value>,
        dedupe: bool,
    ) -> (usize, bool) {
        let fingerprint = Value::Object(fields.clone()).to_string();
        let key = (slot, parent, fingerprint);
        if dedupe {
            if let Some(&id) = self.index.get(&key) {
                return (id, false);
            }
        }
        let id = self.nodes.len();
        self.nodes.push(Node {
            slot,
            fields,
            children: HashMap::new(),
        });
        if dedupe {
            self.index.insert(key, id);
        }
        (id, true)
    }
}

/// Nested objects for a compiled query's result set
pub fn assemble_rows(result: &ResultSet, tables: &TableRegistry) -> Vec<Value> {
    // Column indices per slot; labels that are not wire aliases go to the root.
    let mut columns: HashMap<Slot, Vec<(usize, String)>> = HashMap::new();
    for (i, column) in result.columns.iter().enumerate() {
        let (slot, name) = match decode_alias(&column.name) {
            Some(alias) => ((alias.level, alias.sublevel), alias.name.to_string()),
            None => ((0, 0), column.name.clone()),
        };
        columns.entry(slot).or_default().push((i, name));
    }

    // Without nesting every row is its own object.
    let dedupe = tables.max_level() > 0;
    let mut arena = Arena::default();
    let mut roots = Vec::new();

    for row in &result.rows {
        let fields = slot_fields(result, row, columns.get(&(0, 0)));
        let (root, created) = arena.node((0, 0), None, fields, dedupe);
        if created {
            roots.push(root);
        }
        fold_children(&mut arena, result, row, tables, &columns, (0, 0), root);
    }

    roots
        .into_iter()
        .map(|id| Value::Object(materialize(&arena, tables, id)))
        .collect()
}

fn slot_fields(
    result: &ResultSet,
    row: &[Cell],
    columns: Option<&Vec<(usize, String)>>,
) -> Map<String, Value> {
    let mut fields = Map::new();
    for (i, name) in columns.into_iter().flatten() {
        if let (Some(cell), Some(info)) = (row.get(*i), result.columns.get(*i)) {
            fields.insert(name.clone(), coerce_cell(cell, info.normalized));
        }
    }
    fields
}

fn fold_children(
    arena: &mut Arena,
    result: &ResultSet,
    row: &[Cell],
    tables: &TableRegistry,
    columns: &HashMap<Slot, Vec<(usize, String)>>,
    slot: Slot,
    parent: usize,
) {
    let Some(table) = tables.get(slot.0, slot.1) else {
        return;
    };
    for entry in &table.entries {
        let SlotEntry::Child(sub) = entry else {
            continue;
        };
        let child_slot = (slot.0 + 1, *sub);
        let fields = slot_fields(result, row, columns.get(&child_slot));

        // An outer join without a match yields an all-null slice.
        if !fields.is_empty() && fields.values().all(Value::is_null) {
            continue;
        }

        let (child, created) = arena.node(child_slot, Some(parent), fields, true);
        if created {
            arena.nodes[parent]
                .children
                .entry(*sub)
                .or_default()
                .push(child);
        }
        fold_children(arena, result, row, tables, columns, child_slot, child);
    }
}

fn materialize(arena: &Arena, tables: &TableRegistry, id: usize) -> Map<String, Value> {
    let node = &arena.nodes[id];
    let Some(table) = tables.get(node.slot.0, node.slot.1) else {
        return node.fields.clone();
    };

    let mut object = Map::new();
    for entry in &table.entries {
        match entry {
            SlotEntry::Field(name) => {
                if let Some(value) = node.fields.get(name) {
                    object.insert(name.clone(), value.clone());
                }
            }
            SlotEntry::Child(sub) => {
                let Some(child_table) = tables.get(node.slot.0 + 1, *sub) else {
                    continue;
                };
                let items = node
                    .children
                    .get(sub)
                    .map(|ids| {
                        ids.iter()
                            .map(|&child| Value::Object(materialize(arena, tables, child)))
                            .collect()
                    })
                    .unwrap_or_default();
                object.insert(child_table.output_name.clone(), Value::Array(items));
            }
        }
    }

    // Columns the layout does not name (raw labels) keep row order.
    for (name, value) in &node.fields {
        if !object.contains_key(name) {
            object.insert(name.clone(), value.clone());
        }
    }
    object
}

/// Header plus one string row per result row, aliases stripped
pub fn assemble_csv(result: &ResultSet) -> Vec<Vec<String>> {
    let header = result
        .columns
        .iter()
        .map(|c| strip_alias(&c.name).to_string())
        .collect();

    let mut lines = Vec::with_capacity(result.rows.len() + 1);
    lines.push(header);
    for row in &result.rows {
        lines.push(
            row.iter()
                .zip(&result.columns)
                .map(|(cell, info)| value_to_csv_string(&coerce_cell(cell, info.normalized)))
                .collect(),
        );
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::TableSlot;
    use crate::schema::NormalizedType;
    use crate::value::ColumnInfo;
    use serde_json::json;

    fn registry() -> TableRegistry {
        let mut tables = TableRegistry::default();
        tables.push(
            0,
            TableSlot {
                table: "users".into(),
                output_name: "users".into(),
                nested: false,
                parent: None,
                entries: vec![
                    SlotEntry::Field("id".into()),
                    SlotEntry::Child(0),
                    SlotEntry::Field("name".into()),
                ],
            },
        );
        tables.push(
            1,
            TableSlot {
                table: "orders".into(),
                output_name: "orders".into(),
                nested: true,
                parent: Some(0),
                entries: vec![SlotEntry::Field("id".into()), SlotEntry::Field("total".into())],
            },
        );
        tables
    }

    fn result(rows: Vec<Vec<Cell>>) -> ResultSet {
        ResultSet {
            columns: vec![
                ColumnInfo::new("L0~~0**id", "int", NormalizedType::Integer),
                ColumnInfo::new("L0~~0**name", "text", NormalizedType::String),
                ColumnInfo::new("L1~~0**id", "int", NormalizedType::Integer),
                ColumnInfo::new("L1~~0**total", "numeric", NormalizedType::Decimal),
            ],
            rows,
            ..Default::default()
        }
    }

    #[test]
    fn test_fan_out_collapses_parent() {
        let rows = (1..=3)
            .map(|i| {
                vec![
                    Cell::Int(1),
                    Cell::Text("ann".into()),
                    Cell::Int(i),
                    Cell::Bytes(format!("{}.5", i).into_bytes()),
                ]
            })
            .collect();

        let objects = assemble_rows(&result(rows), &registry());
        assert_eq!(
            objects,
            vec![json!({
                "id": 1,
                "orders": [
                    {"id": 1, "total": 1.5},
                    {"id": 2, "total": 2.5},
                    {"id": 3, "total": 3.5}
                ],
                "name": "ann"
            })]
        );
    }

    #[test]
    fn test_unmatched_outer_join_gives_empty_array() {
        let rows = vec![
            vec![Cell::Int(1), Cell::Text("ann".into()), Cell::Int(9), Cell::Float(2.0)],
            vec![Cell::Int(2), Cell::Text("bob".into()), Cell::Null, Cell::Null],
        ];
        let objects = assemble_rows(&result(rows), &registry());
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[1]["orders"], json!([]));
        assert_eq!(objects[0]["orders"][0]["id"], json!(9));
    }

    #[test]
    fn test_flat_queries_keep_duplicate_rows() {
        let mut tables = TableRegistry::default();
        tables.push(
            0,
            TableSlot {
                table: "users".into(),
                output_name: "users".into(),
                nested: false,
                parent: None,
                entries: vec![SlotEntry::Field("name".into())],
            },
        );
        let result = ResultSet {
            columns: vec![ColumnInfo::new("L0~~0**name", "text", NormalizedType::String)],
            rows: vec![vec![Cell::Text("ann".into())], vec![Cell::Text("ann".into())]],
            ..Default::default()
        };
        assert_eq!(assemble_rows(&result, &tables).len(), 2);
    }

    #[test]
    fn test_csv_strips_aliases() {
        let rows = vec![vec![Cell::Int(1), Cell::Text("ann".into()), Cell::Null, Cell::Null]];
        let lines = assemble_csv(&result(rows));
        assert_eq!(lines[0], vec!["id", "name", "id", "total"]);
        assert_eq!(lines[1], vec!["1", "ann", "", ""]);
    }
}
