//! Read-query compiler.
//!
//! Walks a field selection depth-first and produces one SELECT per
//! top-level field. Columns are flattened into one list and aliased with
//! their nesting position (see [`alias`]); the [`TableRegistry`] records
//! which table sits at every `(level, sublevel)` so the assembler can fold
//! the rows back.

mod alias;
mod filter;
mod sort;

pub use alias::{decode_alias, encode_alias, strip_alias, ColumnAlias};
pub use filter::{sql_literal, FilterCompiler, CONST_PREFIX};
pub use sort::compile_sort;

use crate::dialect::SqlDialect;
use crate::error::{StrataError, StrataResult};
use crate::guard;
use crate::ident::{ensure_identifier, normalize_table, qualify};
use crate::request::{Field, Variables};
use crate::rules::{Rules, SecurityDecision};
use crate::schema::{JoinKind, SchemaRegistry};
use serde_json::Value;
use std::collections::HashSet;
use tracing::debug;

/// Aggregate wrappers accepted on leaf fields
pub const AGGREGATES: &[&str] = &["sum", "count", "avg", "min", "max"];

/// Member of a table slot, in selection order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotEntry {
    Field(String),
    /// Nested table at the next level, by sublevel
    Child(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSlot {
    pub table: String,
    /// Key under which this table's objects appear in the parent
    pub output_name: String,
    pub nested: bool,
    /// Sublevel of the parent slot one level up
    pub parent: Option<usize>,
    pub entries: Vec<SlotEntry>,
}

/// `tables[level][sublevel]`.
///
/// Sublevels are numbered per level across all parents, so a
/// `(level, sublevel)` pair names exactly one selection node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableRegistry {
    levels: Vec<Vec<TableSlot>>,
}

impl TableRegistry {
    /// Register a slot at `level`, returning its sublevel
    pub fn push(&mut self, level: usize, slot: TableSlot) -> usize {
        while self.levels.len() <= level {
            self.levels.push(Vec::new());
        }
        self.levels[level].push(slot);
        self.levels[level].len() - 1
    }

    pub fn get(&self, level: usize, sublevel: usize) -> Option<&TableSlot> {
        self.levels.get(level).and_then(|l| l.get(sublevel))
    }

    fn get_mut(&mut self, level: usize, sublevel: usize) -> Option<&mut TableSlot> {
        self.levels.get_mut(level).and_then(|l| l.get_mut(sublevel))
    }

    pub fn max_level(&self) -> usize {
        self.levels.len().saturating_sub(1)
    }

    pub fn is_nested(&self, level: usize, sublevel: usize) -> bool {
        self.get(level, sublevel).is_some_and(|s| s.nested)
    }

    pub fn level_len(&self, level: usize) -> usize {
        self.levels.get(level).map_or(0, Vec::len)
    }
}

/// One entry of the select list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectColumn {
    pub expression: String,
    /// Unquoted wire alias
    pub alias: String,
    pub level: usize,
    pub sublevel: usize,
    pub name: String,
    pub aggregate: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub main_table: String,
    pub output_name: String,
    pub columns: Vec<SelectColumn>,
    pub joins: Vec<String>,
    pub filter: Option<String>,
    pub group_by: Vec<String>,
    pub order_by: Vec<String>,
    pub distinct: bool,
    pub limit: i64,
    pub skip: i64,
    pub tables: TableRegistry,
    /// Final statement including row limiting
    pub sql: String,
    /// Caller asked for the flat CSV rendition
    pub csv: bool,
}

impl CompiledQuery {
    /// Output names of the main table's columns, in order
    pub fn output_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.level == 0)
            .map(|c| c.name.as_str())
            .collect()
    }
}

/// Compiles selections against one data source's schema
pub struct QueryCompiler<'a> {
    schema: &'a SchemaRegistry,
    dialect: &'a dyn SqlDialect,
    rules: Rules,
    default_limit: i64,
}

struct Walk<'v> {
    variables: &'v Variables,
    tables: TableRegistry,
    columns: Vec<SelectColumn>,
    joins: Vec<String>,
    joined: HashSet<String>,
    filters: Vec<String>,
    order_by: Vec<String>,
}

impl<'a> QueryCompiler<'a> {
    pub fn new(schema: &'a SchemaRegistry, dialect: &'a dyn SqlDialect) -> Self {
        Self {
            schema,
            dialect,
            rules: Rules::default(),
            default_limit: 1000,
        }
    }

    pub fn with_rules(mut self, rules: Rules) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_default_limit(mut self, default_limit: i64) -> Self {
        self.default_limit = default_limit;
        self
    }

    /// Compile a top-level field, applying the default limit
    pub fn compile(&self, field: &Field, variables: &Variables) -> StrataResult<CompiledQuery> {
        self.compile_inner(field, variables, true)
    }

    /// Compile without the default limit (named upstream queries)
    pub fn compile_unlimited(
        &self,
        field: &Field,
        variables: &Variables,
    ) -> StrataResult<CompiledQuery> {
        self.compile_inner(field, variables, false)
    }

    fn compile_inner(
        &self,
        field: &Field,
        variables: &Variables,
        apply_default_limit: bool,
    ) -> StrataResult<CompiledQuery> {
        let main = normalize_table(&field.name);
        ensure_identifier("table", &main)?;
        self.schema.table(&main)?;
        screen_arguments(field, variables)?;

        let distinct = bool_argument(field, "distinct", variables)?;
        let limit = int_argument(field, "limit", variables)?;
        let skip = int_argument(field, "skip", variables)?;

        let mut walk = Walk {
            variables,
            tables: TableRegistry::default(),
            columns: Vec::new(),
            joins: Vec::new(),
            joined: HashSet::from([main.clone()]),
            filters: Vec::new(),
            order_by: Vec::new(),
        };

        let root = walk.tables.push(
            0,
            TableSlot {
                table: main.clone(),
                output_name: field.output_name().to_string(),
                nested: false,
                parent: None,
                entries: Vec::new(),
            },
        );

        self.table_clauses(&mut walk, field, &main)?;
        self.walk_fields(&mut walk, field, &main, 0, root)?;

        if walk.columns.is_empty() {
            return Err(StrataError::invalid(format!(
                "selection on `{}` requests no columns",
                main
            )));
        }

        let group_by = if walk.columns.iter().any(|c| c.aggregate) {
            let mut seen = HashSet::new();
            walk.columns
                .iter()
                .filter(|c| !c.aggregate)
                .map(|c| c.expression.clone())
                .filter(|e| seen.insert(e.clone()))
                .collect()
        } else {
            Vec::new()
        };

        let filter = match walk.filters.len() {
            0 => None,
            _ => Some(walk.filters.join(" AND ")),
        };

        let select_list = walk
            .columns
            .iter()
            .map(|c| format!("{} AS {}", c.expression, self.dialect.quote_alias(&c.alias)))
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!(
            "SELECT {}{} FROM {}",
            if distinct { "DISTINCT " } else { "" },
            select_list,
            main
        );
        for join in &walk.joins {
            sql.push(' ');
            sql.push_str(join);
        }
        if let Some(filter) = &filter {
            sql.push_str(" WHERE ");
            sql.push_str(filter);
        }
        if !group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&group_by.join(", "));
        }
        if !walk.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&walk.order_by.join(", "));
        }
        if apply_default_limit || limit > 0 || skip > 0 {
            sql = self
                .dialect
                .build_limit_offset(&sql, limit, skip, self.default_limit);
        }

        debug!(table = %main, sql = %sql, "Compiled read query");

        Ok(CompiledQuery {
            main_table: main,
            output_name: field.output_name().to_string(),
            columns: walk.columns,
            joins: walk.joins,
            filter,
            group_by,
            order_by: walk.order_by,
            distinct,
            limit,
            skip,
            tables: walk.tables,
            sql,
            csv: field.has_directive("csv"),
        })
    }

    fn walk_fields(
        &self,
        walk: &mut Walk<'_>,
        field: &Field,
        table: &str,
        level: usize,
        sublevel: usize,
    ) -> StrataResult<()> {
        for child in &field.selection {
            let output = child.output_name().to_string();
            ensure_identifier("field", &output)?;

            if child.is_leaf() {
                self.leaf_column(walk, child, table, level, sublevel)?;
                if let Some(slot) = walk.tables.get_mut(level, sublevel) {
                    slot.entries.push(SlotEntry::Field(output));
                }
                continue;
            }

            let child_table = normalize_table(&child.name);
            ensure_identifier("table", &child_table)?;
            self.schema.table(&child_table)?;

            let child_sub = walk.tables.push(
                level + 1,
                TableSlot {
                    table: child_table.clone(),
                    output_name: output,
                    nested: true,
                    parent: Some(sublevel),
                    entries: Vec::new(),
                },
            );
            if let Some(slot) = walk.tables.get_mut(level, sublevel) {
                slot.entries.push(SlotEntry::Child(child_sub));
            }

            self.join(walk, child, table, &child_table)?;
            self.table_clauses(walk, child, &child_table)?;
            self.walk_fields(walk, child, &child_table, level + 1, child_sub)?;
        }
        Ok(())
    }

    fn leaf_column(
        &self,
        walk: &mut Walk<'_>,
        field: &Field,
        table: &str,
        level: usize,
        sublevel: usize,
    ) -> StrataResult<()> {
        let base = match field.resolved("calc", walk.variables) {
            Some(Value::String(expression)) => {
                let evaluated = self
                    .rules
                    .expressions
                    .evaluate(&expression, walk.variables)
                    .map_err(|e| rule_failure("expression", e))?;
                guard::check_str("calc", &evaluated)?;
                evaluated
            }
            Some(_) => return Err(StrataError::invalid("`calc` must be a string")),
            None => {
                ensure_identifier("column", &field.name)?;
                if self.schema.column(table, &field.name).is_none() {
                    return Err(StrataError::SchemaNotFound(format!(
                        "column `{}.{}`",
                        table, field.name
                    )));
                }
                format!("{}.{}", table, field.name)
            }
        };

        let aggregate = match field.resolved("aggregate", walk.variables) {
            None => None,
            Some(Value::String(name)) => {
                let name = name.to_ascii_lowercase();
                if !AGGREGATES.contains(&name.as_str()) {
                    return Err(StrataError::invalid(format!(
                        "unknown aggregate `{}` on `{}`",
                        name, field.name
                    )));
                }
                Some(name)
            }
            Some(_) => return Err(StrataError::invalid("`aggregate` must be a string")),
        };
        let distinct = bool_argument(field, "distinct", walk.variables)?;

        let (expression, is_aggregate) = match (aggregate, distinct) {
            (Some(agg), true) => (format!("{}(distinct {})", agg, base), true),
            (None, true) => (format!("count(distinct {})", base), true),
            (Some(agg), false) => (format!("{}({})", agg, base), true),
            (None, false) => (base, false),
        };

        walk.columns.push(SelectColumn {
            expression,
            alias: encode_alias(level, sublevel, field.output_name()),
            level,
            sublevel,
            name: field.output_name().to_string(),
            aggregate: is_aggregate,
        });
        Ok(())
    }

    fn join(
        &self,
        walk: &mut Walk<'_>,
        field: &Field,
        parent: &str,
        child: &str,
    ) -> StrataResult<()> {
        if walk.joined.contains(child) {
            return Ok(());
        }

        let (kind, condition) = match field.resolved("join", walk.variables) {
            None => (JoinKind::Left, self.registry_condition(parent, child)?),
            Some(Value::String(kind)) => (parse_join_kind(&kind)?, self.registry_condition(parent, child)?),
            Some(Value::Object(spec)) => {
                let kind = match spec.get("type") {
                    None | Some(Value::Null) => JoinKind::Left,
                    Some(Value::String(kind)) => parse_join_kind(kind)?,
                    Some(_) => return Err(StrataError::invalid("`join.type` must be a string")),
                };
                let condition = match spec.get("on") {
                    None | Some(Value::Null) => self.registry_condition(parent, child)?,
                    Some(Value::Object(on)) if !on.is_empty() => {
                        let mut pairs = Vec::with_capacity(on.len());
                        for (left, right) in on {
                            let right = right.as_str().ok_or_else(|| {
                                StrataError::invalid("`join.on` values must be column names")
                            })?;
                            let left = qualify(parent, left);
                            let right = qualify(child, right);
                            ensure_identifier("join", &left)?;
                            ensure_identifier("join", &right)?;
                            pairs.push(format!("{} = {}", left, right));
                        }
                        pairs.join(" AND ")
                    }
                    Some(_) => return Err(StrataError::invalid("`join.on` must be a non-empty object")),
                };
                (kind, condition)
            }
            Some(_) => return Err(StrataError::invalid("`join` must be a string or an object")),
        };

        walk.joins.push(format!("{} {} ON {}", kind.sql(), child, condition));
        walk.joined.insert(child.to_string());
        Ok(())
    }

    fn registry_condition(&self, parent: &str, child: &str) -> StrataResult<String> {
        let join = self.schema.get_join(parent, child)?;
        let mut condition = join.equality_condition();

        if let Some(complex) = &join.complex_condition {
            let extra = FilterCompiler::new(self.dialect, child)
                .column_references()
                .compile(complex)?;
            if let Some(extra) = extra {
                condition = if condition.is_empty() {
                    extra
                } else {
                    format!("{} AND {}", condition, extra)
                };
            }
        }

        if condition.is_empty() {
            return Err(StrataError::JoinNotFound {
                parent: parent.to_string(),
                child: child.to_string(),
            });
        }
        Ok(condition)
    }

    /// `where`, `sort` and security-rule filter of one table node
    fn table_clauses(&self, walk: &mut Walk<'_>, field: &Field, table: &str) -> StrataResult<()> {
        if let Some(filter) = field.resolved("where", walk.variables) {
            if let Some(clause) = FilterCompiler::new(self.dialect, table).compile(&filter)? {
                walk.filters.push(clause);
            }
        }

        let decision = self
            .rules
            .security
            .evaluate(table, self.schema.security_rules.get(table), walk.variables)
            .map_err(|e| rule_failure("security", e))?;
        match decision {
            SecurityDecision::Allow => {}
            SecurityDecision::Deny(reason) => {
                return Err(StrataError::RuleFailure {
                    source_name: "security".to_string(),
                    message: format!("read on `{}` denied: {}", table, reason),
                })
            }
            SecurityDecision::Filter(tree) => {
                if let Some(clause) = FilterCompiler::new(self.dialect, table).compile(&tree)? {
                    walk.filters.push(clause);
                }
            }
        }

        if let Some(sort) = field.resolved("sort", walk.variables) {
            walk.order_by.extend(compile_sort(&sort, table)?);
        }
        Ok(())
    }
}

fn parse_join_kind(kind: &str) -> StrataResult<JoinKind> {
    JoinKind::parse(kind)
        .ok_or_else(|| StrataError::invalid(format!("unknown join type `{}`", kind)))
}

/// Wrap a collaborator error, keeping rule failures as they are
pub(crate) fn rule_failure(source: &str, err: StrataError) -> StrataError {
    match err {
        StrataError::RuleFailure { .. } => err,
        other => StrataError::RuleFailure {
            source_name: source.to_string(),
            message: other.to_string(),
        },
    }
}

/// Blocked-word screening over every argument of a read selection
fn screen_arguments(field: &Field, variables: &Variables) -> StrataResult<()> {
    for argument in &field.arguments {
        if let Some(value) = argument.value.resolve(variables) {
            guard::check_value(&argument.name, &value)?;
        }
    }
    field
        .selection
        .iter()
        .try_for_each(|child| screen_arguments(child, variables))
}

fn bool_argument(field: &Field, name: &str, variables: &Variables) -> StrataResult<bool> {
    match field.resolved(name, variables) {
        None => Ok(false),
        Some(Value::Bool(b)) => Ok(b),
        Some(other) => Err(StrataError::invalid(format!(
            "`{}` on `{}` must be a boolean, got {}",
            name, field.name, other
        ))),
    }
}

fn int_argument(field: &Field, name: &str, variables: &Variables) -> StrataResult<i64> {
    match field.resolved(name, variables) {
        None => Ok(0),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .ok_or_else(|| StrataError::invalid(format!("`{}` is out of range", name))),
        Some(other) => Err(StrataError::invalid(format!(
            "`{}` on `{}` must be an integer, got {}",
            name, field.name, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{MySql, Postgres};
    use crate::request::parse_document;
    use crate::schema::{ColumnMeta, NormalizedType, TableJoin};
    use serde_json::json;

    fn schema() -> SchemaRegistry {
        let mut schema = SchemaRegistry::new("public");
        schema.insert_table(
            "users",
            vec![
                ColumnMeta::new("users", "id", NormalizedType::Integer).primary_key(),
                ColumnMeta::new("users", "name", NormalizedType::String),
                ColumnMeta::new("users", "age", NormalizedType::Integer),
            ],
        );
        schema.insert_table(
            "orders",
            vec![
                ColumnMeta::new("orders", "id", NormalizedType::Integer).primary_key(),
                ColumnMeta::new("orders", "user_id", NormalizedType::Integer)
                    .references("users", "id"),
                ColumnMeta::new("orders", "total", NormalizedType::Float),
            ],
        );
        schema.insert_table(
            "tags",
            vec![ColumnMeta::new("tags", "label", NormalizedType::String)],
        );
        schema.activate_table("users").unwrap();
        schema.activate_table("orders").unwrap();
        schema
    }

    fn field(doc: &str) -> Field {
        parse_document(doc).unwrap().operations[0].selection[0].clone()
    }

    fn compile(schema: &SchemaRegistry, doc: &str) -> StrataResult<CompiledQuery> {
        QueryCompiler::new(schema, &Postgres).compile(&field(doc), &Variables::new())
    }

    const EXAMPLE: &str =
        r#"{ users(where: {age: {$gte: 18}}, sort: "-name") { id name orders { id total } } }"#;

    #[test]
    fn test_example_scenario_sql() {
        let schema = schema();
        let query = compile(&schema, EXAMPLE).unwrap();

        assert_eq!(
            query.sql,
            "SELECT users.id AS \"L0~~0**id\", users.name AS \"L0~~0**name\", \
             orders.id AS \"L1~~0**id\", orders.total AS \"L1~~0**total\" \
             FROM users LEFT JOIN orders ON users.id = orders.user_id \
             WHERE users.age >= 18 ORDER BY users.name DESC LIMIT 1000"
        );
        assert_eq!(query.sql.matches("FROM users").count(), 1);
        assert_eq!(query.tables.get(1, 0).map(|s| s.table.as_str()), Some("orders"));
        assert!(query.tables.is_nested(1, 0));
        assert_eq!(
            query.tables.get(0, 0).unwrap().entries,
            vec![
                SlotEntry::Field("id".to_string()),
                SlotEntry::Field("name".to_string()),
                SlotEntry::Child(0)
            ]
        );
    }

    #[test]
    fn test_compilation_is_deterministic() {
        let schema = schema();
        assert_eq!(
            compile(&schema, EXAMPLE).unwrap().sql,
            compile(&schema, EXAMPLE).unwrap().sql
        );
    }

    #[test]
    fn test_missing_join_and_table() {
        let schema = schema();
        assert!(matches!(
            compile(&schema, "{ users { id tags { label } } }"),
            Err(StrataError::JoinNotFound { .. })
        ));
        assert!(matches!(
            compile(&schema, "{ ghosts { id } }"),
            Err(StrataError::SchemaNotFound(_))
        ));
        assert!(matches!(
            compile(&schema, "{ users { nope } }"),
            Err(StrataError::SchemaNotFound(_))
        ));
    }

    #[test]
    fn test_explicit_join() {
        let schema = schema();
        let query = compile(
            &schema,
            r#"{ users { id tags(join: {type: "inner", on: {"name": "label"}}) { label } } }"#,
        )
        .unwrap();
        assert_eq!(query.joins, vec!["INNER JOIN tags ON users.name = tags.label"]);
    }

    #[test]
    fn test_aggregates_group_by_plain_columns() {
        let schema = schema();
        let query = compile(
            &schema,
            r#"{ users { name spend: orders { total(aggregate: "sum") n: id(aggregate: "count", distinct: true) } } }"#,
        )
        .unwrap();
        assert!(query.sql.contains("sum(orders.total) AS \"L1~~0**total\""));
        assert!(query.sql.contains("count(distinct orders.id) AS \"L1~~0**n\""));
        assert_eq!(query.group_by, vec!["users.name"]);
        assert!(query.sql.contains(" GROUP BY users.name "));
    }

    #[test]
    fn test_no_group_by_without_aggregates() {
        let schema = schema();
        let query = compile(&schema, "{ users(distinct: true) { name } }").unwrap();
        assert!(query.group_by.is_empty());
        assert!(query.sql.starts_with("SELECT DISTINCT users.name"));
    }

    #[test]
    fn test_argument_types() {
        let schema = schema();
        assert!(matches!(
            compile(&schema, r#"{ users(distinct: "yes") { id } }"#),
            Err(StrataError::InvalidArgument(_))
        ));
        assert!(matches!(
            compile(&schema, r#"{ users(limit: "ten") { id } }"#),
            Err(StrataError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_drop_table_blocked_in_every_position() {
        let schema = schema();
        for doc in [
            r#"{ users(where: {name: "x drop table users"}) { id } }"#,
            r#"{ users(sort: "DROP TABLE users") { id } }"#,
            r#"{ users { id total: id(calc: "1; Drop Table users") } }"#,
        ] {
            assert!(
                matches!(compile(&schema, doc), Err(StrataError::SuspiciousInput { .. })),
                "{}",
                doc
            );
        }
    }

    #[test]
    fn test_limit_skip_and_dialect_quoting() {
        let schema = schema();
        let query = QueryCompiler::new(&schema, &MySql)
            .compile(&field("{ users(limit: 10, skip: 5) { id } }"), &Variables::new())
            .unwrap();
        assert_eq!(query.sql, "SELECT users.id AS `L0~~0**id` FROM users LIMIT 5, 10");
    }

    #[test]
    fn test_unlimited_compile_for_named_queries() {
        let schema = schema();
        let query = QueryCompiler::new(&schema, &Postgres)
            .compile_unlimited(&field("{ users { id name } }"), &Variables::new())
            .unwrap();
        assert!(!query.sql.contains("LIMIT"));
        assert_eq!(query.output_columns(), vec!["id", "name"]);
    }

    #[test]
    fn test_variables_feed_filters() {
        let schema = schema();
        let vars = json!({"min": 21}).as_object().cloned().unwrap();
        let query = QueryCompiler::new(&schema, &Postgres)
            .compile(
                &field("{ users(where: {age: {$gte: $min}, name: $missing}) { id } }"),
                &vars,
            )
            .unwrap();
        assert_eq!(query.filter.as_deref(), Some("users.age >= 21"));
    }

    #[test]
    fn test_sublevels_are_unique_per_level() {
        let mut schema = schema();
        schema.insert_table(
            "items",
            vec![
                ColumnMeta::new("items", "id", NormalizedType::Integer),
                ColumnMeta::new("items", "order_id", NormalizedType::Integer),
            ],
        );
        schema.add_join(TableJoin::new(
            "orders",
            vec!["id".into()],
            "items",
            vec!["order_id".into()],
        ));
        let query = compile(&schema, "{ users { id orders { id items { id } } } }").unwrap();
        assert_eq!(query.tables.get(2, 0).unwrap().parent, Some(0));
        assert!(query.sql.contains("items.id AS \"L2~~0**id\""));
        assert!(query.sql.contains("LEFT JOIN items ON orders.id = items.order_id"));
    }

    #[test]
    fn test_nested_where_is_anded() {
        let schema = schema();
        let query = compile(
            &schema,
            "{ users(where: {age: {$gt: 1}}) { id orders(where: {total: {$gt: 100}}) { id } } }",
        )
        .unwrap();
        assert_eq!(
            query.filter.as_deref(),
            Some("users.age > 1 AND orders.total > 100")
        );
    }
}
