//! Schema & join registry for one data source
//!
//! Holds the tables of the active schema, the discovered-but-inactive
//! tables, and the join graph keyed by `table1___table2`.

use crate::error::{StrataError, StrataResult};
use crate::schema::column::ColumnMeta;
use crate::schema::join::{join_key, TableJoin};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// columnName -> metadata
pub type TableColumns = BTreeMap<String, ColumnMeta>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaRegistry {
    /// Schema whose tables are keyed by bare name
    pub default_schema: String,
    /// Tables in the active schema
    pub schema_tables: BTreeMap<String, TableColumns>,
    /// Discovered tables not yet included
    pub other_tables: BTreeMap<String, TableColumns>,
    pub table_joins: BTreeMap<String, TableJoin>,
    /// Opaque per-table rule definitions for the security collaborator
    pub security_rules: BTreeMap<String, Value>,
    /// Opaque per-table rule definitions for the transform collaborator
    pub transform_rules: BTreeMap<String, Value>,
}

impl SchemaRegistry {
    pub fn new(default_schema: impl Into<String>) -> Self {
        Self {
            default_schema: default_schema.into(),
            ..Default::default()
        }
    }

    /// Registry key for a table: bare in the default schema, dotted otherwise
    pub fn table_key(&self, schema: &str, table: &str) -> String {
        if schema.is_empty() || schema == self.default_schema {
            table.to_string()
        } else {
            format!("{}.{}", schema, table)
        }
    }

    /// Store introspected columns.
    ///
    /// Active tables are refreshed in place; everything else lands in
    /// `other_tables`.
    pub fn capture_columns(&mut self, columns: impl IntoIterator<Item = ColumnMeta>) {
        let mut captured: BTreeMap<String, TableColumns> = BTreeMap::new();
        for column in columns {
            let key = self.table_key(&column.schema_name, &column.table_name);
            captured
                .entry(key)
                .or_default()
                .insert(column.column_name.clone(), column);
        }

        for (table, columns) in captured {
            debug!(table = %table, columns = columns.len(), "Captured table metadata");
            if self.schema_tables.contains_key(&table) {
                self.schema_tables.insert(table, columns);
            } else {
                self.other_tables.insert(table, columns);
            }
        }
    }

    /// Put a table directly into the active schema (hand-built schemas)
    pub fn insert_table(&mut self, table: impl Into<String>, columns: Vec<ColumnMeta>) {
        let table = table.into();
        let columns = columns
            .into_iter()
            .map(|c| (c.column_name.clone(), c))
            .collect();
        self.other_tables.remove(&table);
        self.schema_tables.insert(table, columns);
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.schema_tables.contains_key(table)
    }

    pub fn table(&self, table: &str) -> StrataResult<&TableColumns> {
        self.schema_tables
            .get(table)
            .ok_or_else(|| StrataError::SchemaNotFound(format!("table `{}`", table)))
    }

    pub fn column(&self, table: &str, column: &str) -> Option<&ColumnMeta> {
        self.schema_tables.get(table).and_then(|t| t.get(column))
    }

    /// Primary key columns in ordinal order
    pub fn primary_key(&self, table: &str) -> Vec<String> {
        let mut pk: Vec<&ColumnMeta> = self
            .schema_tables
            .get(table)
            .map(|t| t.values().filter(|c| c.is_primary_key).collect())
            .unwrap_or_default();
        pk.sort_by_key(|c| c.ordinal_position);
        pk.into_iter().map(|c| c.column_name.clone()).collect()
    }

    pub fn auto_increment_column(&self, table: &str) -> Option<&ColumnMeta> {
        self.schema_tables
            .get(table)
            .and_then(|t| t.values().find(|c| c.is_auto_increment))
    }

    /// Resolve how `child` joins to `parent`.
    ///
    /// The returned join always has `parent` on side 1 and `child` on
    /// side 2, so the caller's own columns are `table2_cols`.
    pub fn get_join(&self, parent: &str, child: &str) -> StrataResult<TableJoin> {
        for table in [parent, child] {
            if !self.has_table(table) {
                return Err(StrataError::SchemaNotFound(format!("table `{}`", table)));
            }
        }

        if let Some(join) = self.table_joins.get(&join_key(parent, child)) {
            return Ok(join.clone());
        }
        if let Some(join) = self.table_joins.get(&join_key(child, parent)) {
            return Ok(join.swapped());
        }

        Err(StrataError::JoinNotFound {
            parent: parent.to_string(),
            child: child.to_string(),
        })
    }

    /// Store a join under `table1___table2` exactly as given
    pub fn add_join(&mut self, join: TableJoin) {
        self.table_joins.insert(join.key(), join);
    }

    /// Remove the join stored under `table1___table2` exactly as given
    pub fn remove_join(&mut self, join: &TableJoin) -> Option<TableJoin> {
        self.table_joins.remove(&join.key())
    }

    /// Move a table into the active schema and infer joins from its
    /// foreign keys.
    pub fn activate_table(&mut self, table: &str) -> StrataResult<()> {
        if let Some(columns) = self.other_tables.remove(table) {
            self.schema_tables.insert(table.to_string(), columns);
        } else if !self.schema_tables.contains_key(table) {
            return Err(StrataError::SchemaNotFound(format!("table `{}`", table)));
        }

        let foreign_keys: Vec<(String, String, String)> = self.schema_tables[table]
            .values()
            .filter_map(|c| {
                c.foreign_key.as_ref().map(|fk| {
                    (
                        self.table_key(&fk.schema_name, &fk.table_name),
                        fk.column_name.clone(),
                        c.column_name.clone(),
                    )
                })
            })
            .collect();

        for (referenced, referenced_col, own_col) in foreign_keys {
            let referenced_active = self.schema_tables.contains_key(&referenced);
            let join = self
                .table_joins
                .entry(join_key(&referenced, table))
                .or_insert_with(|| TableJoin {
                    table1: referenced.clone(),
                    table2: table.to_string(),
                    table1_cols: Vec::new(),
                    table2_cols: Vec::new(),
                    is_active: false,
                    is_custom: false,
                    complex_condition: None,
                });

            if !join.table2_cols.contains(&own_col) {
                join.table1_cols.push(referenced_col);
                join.table2_cols.push(own_col);
            }
            join.is_active = referenced_active;
            debug!(join = %join.key(), active = join.is_active, "Inferred join from foreign key");
        }

        for join in self.table_joins.values_mut() {
            if join.table1 == table {
                join.is_active = self.schema_tables.contains_key(&join.table2);
            }
        }

        Ok(())
    }

    /// Move a table back out of the active schema.
    ///
    /// Joins where it is the referenced side are deleted; joins where it is
    /// the referencing side are only marked inactive.
    pub fn deactivate_table(&mut self, table: &str) -> StrataResult<()> {
        let columns = self
            .schema_tables
            .remove(table)
            .ok_or_else(|| StrataError::SchemaNotFound(format!("table `{}`", table)))?;
        self.other_tables.insert(table.to_string(), columns);

        self.table_joins.retain(|_, join| join.table1 != table);
        for join in self.table_joins.values_mut() {
            if join.table2 == table {
                join.is_active = false;
            }
        }

        Ok(())
    }

    pub fn attach_masking_rule(
        &mut self,
        table: &str,
        column: &str,
        rule: impl Into<String>,
    ) -> StrataResult<()> {
        let meta = self
            .schema_tables
            .get_mut(table)
            .and_then(|t| t.get_mut(column))
            .ok_or_else(|| {
                StrataError::SchemaNotFound(format!("column `{}.{}`", table, column))
            })?;
        meta.masking_rule = Some(rule.into());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::column::NormalizedType;

    fn users() -> Vec<ColumnMeta> {
        vec![
            ColumnMeta::new("users", "id", NormalizedType::Integer)
                .primary_key()
                .auto_increment(),
            ColumnMeta::new("users", "name", NormalizedType::String),
        ]
    }

    fn orders() -> Vec<ColumnMeta> {
        vec![
            ColumnMeta::new("orders", "id", NormalizedType::Integer).primary_key(),
            ColumnMeta::new("orders", "user_id", NormalizedType::Integer)
                .references("users", "id"),
        ]
    }

    fn discovered() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new("public");
        registry.capture_columns(users().into_iter().chain(orders()));
        registry
    }

    #[test]
    fn test_capture_puts_tables_in_other() {
        let registry = discovered();
        assert!(registry.schema_tables.is_empty());
        assert_eq!(registry.other_tables.len(), 2);
    }

    #[test]
    fn test_activation_infers_join_from_foreign_key() {
        let mut registry = discovered();
        registry.activate_table("orders").unwrap();

        let join = &registry.table_joins["users___orders"];
        assert_eq!(join.table1, "users");
        assert_eq!(join.table1_cols, vec!["id".to_string()]);
        assert_eq!(join.table2, "orders");
        assert_eq!(join.table2_cols, vec!["user_id".to_string()]);
        assert!(!join.is_active, "users is not active yet");
        assert!(!join.is_custom);

        registry.activate_table("users").unwrap();
        assert!(registry.table_joins["users___orders"].is_active);
    }

    #[test]
    fn test_get_join_orients_parent_first() {
        let mut registry = discovered();
        registry.activate_table("users").unwrap();
        registry.activate_table("orders").unwrap();

        let direct = registry.get_join("users", "orders").unwrap();
        assert_eq!(direct.table1, "users");
        assert_eq!(direct.table2_cols, vec!["user_id".to_string()]);

        let reverse = registry.get_join("orders", "users").unwrap();
        assert_eq!(reverse.table1, "orders");
        assert_eq!(reverse.table1_cols, vec!["user_id".to_string()]);
        assert_eq!(reverse.table2, "users");
        assert_eq!(reverse.table2_cols, vec!["id".to_string()]);
    }

    #[test]
    fn test_get_join_errors() {
        let mut registry = discovered();
        registry.activate_table("users").unwrap();

        assert!(matches!(
            registry.get_join("users", "orders"),
            Err(StrataError::SchemaNotFound(_))
        ));

        registry.insert_table("tags", vec![ColumnMeta::new("tags", "id", NormalizedType::Integer)]);
        assert!(matches!(
            registry.get_join("users", "tags"),
            Err(StrataError::JoinNotFound { .. })
        ));
    }

    #[test]
    fn test_add_and_remove_join_use_key_as_given() {
        let mut registry = discovered();
        let join = TableJoin::new("orders", vec!["id".into()], "users", vec!["id".into()]);
        registry.add_join(join.clone());
        assert!(registry.table_joins.contains_key("orders___users"));
        assert!(!registry.table_joins.contains_key("users___orders"));

        assert!(registry.remove_join(&join.swapped()).is_none());
        assert!(registry.remove_join(&join).is_some());
    }

    #[test]
    fn test_deactivate_referenced_table_deletes_join() {
        let mut registry = discovered();
        registry.activate_table("users").unwrap();
        registry.activate_table("orders").unwrap();

        registry.deactivate_table("users").unwrap();
        assert!(!registry.table_joins.contains_key("users___orders"));
        assert!(registry.other_tables.contains_key("users"));
    }

    #[test]
    fn test_deactivate_referencing_table_marks_inactive() {
        let mut registry = discovered();
        registry.activate_table("users").unwrap();
        registry.activate_table("orders").unwrap();

        registry.deactivate_table("orders").unwrap();
        let join = &registry.table_joins["users___orders"];
        assert!(!join.is_active);

        registry.activate_table("orders").unwrap();
        assert!(registry.table_joins["users___orders"].is_active);
        assert_eq!(registry.table_joins["users___orders"].table2_cols.len(), 1);
    }

    #[test]
    fn test_non_default_schema_keys_are_dotted() {
        let mut registry = SchemaRegistry::new("public");
        let mut col = ColumnMeta::new("invoices", "id", NormalizedType::Integer);
        col.schema_name = "billing".to_string();
        registry.capture_columns(vec![col]);

        assert!(registry.other_tables.contains_key("billing.invoices"));
        registry.activate_table("billing.invoices").unwrap();
        assert!(registry.has_table("billing.invoices"));
    }

    #[test]
    fn test_primary_key_and_auto_increment() {
        let mut registry = SchemaRegistry::new("public");
        registry.insert_table("users", users());
        assert_eq!(registry.primary_key("users"), vec!["id".to_string()]);
        assert_eq!(
            registry.auto_increment_column("users").map(|c| c.column_name.as_str()),
            Some("id")
        );
    }

    #[test]
    fn test_attach_masking_rule() {
        let mut registry = SchemaRegistry::new("public");
        registry.insert_table("users", users());
        registry.attach_masking_rule("users", "name", "mask_all").unwrap();
        assert_eq!(
            registry.column("users", "name").unwrap().masking_rule.as_deref(),
            Some("mask_all")
        );
        assert!(registry.attach_masking_rule("users", "nope", "x").is_err());
    }
}
