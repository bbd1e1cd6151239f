use super::{
    delete_sql, insert_select_sql, insert_sql, update_sql, InjectedColumn, MutationKind,
    MutationPlan, ParentLink, Projection, WriteNode,
};
use crate::compile::{rule_failure, CompiledQuery, FilterCompiler};
use crate::dialect::SqlDialect;
use crate::error::{StrataError, StrataResult};
use crate::guard;
use crate::ident::{ensure_identifier, normalize_table};
use crate::request::{Field, Variables};
use crate::rules::{Rules, SecurityDecision};
use crate::schema::{SchemaRegistry, TableJoin};
use serde_json::{Map, Value};
use tracing::{debug, warn};

type Document = Map<String, Value>;

/// Nested documents bound for a joined child table
struct ChildDocuments {
    key: String,
    table: String,
    join: TableJoin,
    documents: Vec<Document>,
}

/// Plain columns and child groups of one document
struct SplitDocument {
    columns: Vec<(String, Value)>,
    children: Vec<ChildDocuments>,
}

/// Turns mutation fields into [`MutationPlan`]s
pub struct MutationPlanner<'a> {
    schema: &'a SchemaRegistry,
    dialect: &'a dyn SqlDialect,
    rules: Rules,
}

struct Builder<'p, 'a> {
    planner: &'p MutationPlanner<'a>,
    variables: &'p Variables,
    nodes: Vec<WriteNode>,
}

impl<'a> MutationPlanner<'a> {
    pub fn new(schema: &'a SchemaRegistry, dialect: &'a dyn SqlDialect) -> Self {
        Self {
            schema,
            dialect,
            rules: Rules::default(),
        }
    }

    pub fn with_rules(mut self, rules: Rules) -> Self {
        self.rules = rules;
        self
    }

    /// Plan an `insert_*`, `update_*` or `delete_*` field
    pub fn plan(&self, field: &Field, variables: &Variables) -> StrataResult<MutationPlan> {
        let (kind, table) = self.target(field)?;
        let projection = returning_projection(field);

        match kind {
            MutationKind::Insert => {
                let docs = required_docs(field, variables)?;
                self.plan_insert(&table, &docs, projection, variables)
            }
            MutationKind::Update => {
                let docs = required_docs(field, variables)?;
                let filter = field.resolved("where", variables);
                self.plan_update(&table, &docs, filter.as_ref(), projection, variables)
            }
            MutationKind::Delete => {
                let filter = field.resolved("where", variables);
                self.plan_delete(&table, filter.as_ref(), projection, variables)
            }
            MutationKind::InsertSelect => Err(StrataError::invalid(format!(
                "`{}` needs the named query given by `select`",
                field.name
            ))),
        }
    }

    pub fn plan_insert(
        &self,
        table: &str,
        docs: &Value,
        projection: Projection,
        variables: &Variables,
    ) -> StrataResult<MutationPlan> {
        let documents = as_documents(table, docs)?;
        self.check_write(table, MutationKind::Insert, variables)?;

        let mut builder = Builder::new(self, variables);
        let mut split = Vec::with_capacity(documents.len());
        for document in documents {
            split.push(builder.split_document(table, document)?);
        }

        // The first document's columns fix the batch layout.
        let columns: Vec<String> = split[0].columns.iter().map(|(c, _)| c.clone()).collect();
        if columns.is_empty() {
            return Err(StrataError::invalid(format!(
                "insert into `{}` has no column values",
                table
            )));
        }

        let mut rows = Vec::with_capacity(split.len());
        for (i, doc) in split.iter().enumerate() {
            let extra: Vec<&str> = doc
                .columns
                .iter()
                .map(|(c, _)| c.as_str())
                .filter(|c| !columns.iter().any(|k| k == c))
                .collect();
            if !extra.is_empty() {
                warn!(table = %table, document = i + 1, columns = ?extra, "Ignoring columns missing from the first document");
            }
            rows.push(
                columns
                    .iter()
                    .map(|c| {
                        doc.columns
                            .iter()
                            .find(|(k, _)| k == c)
                            .map(|(_, v)| v.clone())
                            .unwrap_or(Value::Null)
                    })
                    .collect(),
            );
        }

        let root = builder.push(table, MutationKind::Insert, columns, rows, 1, projection.clone());
        for (row, doc) in split.into_iter().enumerate() {
            for group in doc.children {
                builder.attach_children(root, row, group, row + 1)?;
            }
        }
        builder.finish(root);

        Ok(builder.into_plan(MutationKind::Insert, table, root, projection))
    }

    /// Nested children of the document are inserted under the first
    /// updated row.
    pub fn plan_update(
        &self,
        table: &str,
        docs: &Value,
        filter: Option<&Value>,
        projection: Projection,
        variables: &Variables,
    ) -> StrataResult<MutationPlan> {
        let document = match docs {
            Value::Object(map) => map.clone(),
            Value::Array(_) => {
                return Err(StrataError::invalid(format!(
                    "update of `{}` takes a single document, not an array",
                    table
                )))
            }
            other => {
                return Err(StrataError::invalid(format!(
                    "update document for `{}` must be an object, got {}",
                    table, other
                )))
            }
        };
        let filter = self.write_filter(table, MutationKind::Update, filter, variables)?;

        let mut builder = Builder::new(self, variables);
        let split = builder.split_document(table, document)?;
        if split.columns.is_empty() {
            return Err(StrataError::invalid(format!("update of `{}` sets no columns", table)));
        }

        let (columns, values): (Vec<_>, Vec<_>) = split.columns.into_iter().unzip();
        let root = builder.push(table, MutationKind::Update, columns, vec![values], 1, projection.clone());
        builder.nodes[root].filter = filter;
        for group in split.children {
            builder.attach_children(root, 0, group, 1)?;
        }
        builder.finish(root);

        Ok(builder.into_plan(MutationKind::Update, table, root, projection))
    }

    pub fn plan_delete(
        &self,
        table: &str,
        filter: Option<&Value>,
        projection: Projection,
        variables: &Variables,
    ) -> StrataResult<MutationPlan> {
        let filter = self.write_filter(table, MutationKind::Delete, filter, variables)?;

        let mut builder = Builder::new(self, variables);
        let root = builder.push(table, MutationKind::Delete, Vec::new(), Vec::new(), 1, projection.clone());
        builder.nodes[root].filter = filter;
        builder.finish(root);

        Ok(builder.into_plan(MutationKind::Delete, table, root, projection))
    }

    /// Plan an `insertselect_*` field fed by an already compiled query
    pub fn plan_insert_select(
        &self,
        field: &Field,
        query: &CompiledQuery,
        variables: &Variables,
    ) -> StrataResult<MutationPlan> {
        let (kind, table) = self.target(field)?;
        if kind != MutationKind::InsertSelect {
            return Err(StrataError::invalid(format!(
                "`{}` is not an insertselect field",
                field.name
            )));
        }
        if query.columns.iter().any(|c| c.level > 0) {
            return Err(StrataError::invalid(format!(
                "query feeding `{}` must not select nested tables",
                field.name
            )));
        }
        self.check_write(&table, kind, variables)?;

        let projection = returning_projection(field);
        let columns: Vec<String> = query.output_columns().into_iter().map(String::from).collect();
        for column in &columns {
            ensure_identifier("column", column)?;
        }

        let mut builder = Builder::new(self, variables);
        let root = builder.push(&table, kind, columns, Vec::new(), 1, projection.clone());
        let node = &mut builder.nodes[root];
        node.sql = insert_select_sql(self.dialect, &table, &node.columns, &query.sql, &node.returning);
        debug!(table = %table, sql = %node.sql, "Planned insert from select");

        Ok(builder.into_plan(kind, &table, root, projection))
    }

    fn target(&self, field: &Field) -> StrataResult<(MutationKind, String)> {
        let (kind, table) = MutationKind::from_field_name(&field.name).ok_or_else(|| {
            StrataError::invalid(format!("`{}` is not a mutation field", field.name))
        })?;
        let table = normalize_table(table);
        ensure_identifier("table", &table)?;
        self.schema.table(&table)?;
        Ok((kind, table))
    }

    fn security(&self, table: &str, variables: &Variables) -> StrataResult<SecurityDecision> {
        self.rules
            .security
            .evaluate(table, self.schema.security_rules.get(table), variables)
            .map_err(|e| rule_failure("security", e))
    }

    /// Inserts only honor a deny decision
    fn check_write(&self, table: &str, kind: MutationKind, variables: &Variables) -> StrataResult<()> {
        match self.security(table, variables)? {
            SecurityDecision::Deny(reason) => Err(denied(table, kind, reason)),
            _ => Ok(()),
        }
    }

    fn write_filter(
        &self,
        table: &str,
        kind: MutationKind,
        filter: Option<&Value>,
        variables: &Variables,
    ) -> StrataResult<Option<String>> {
        let compiler = FilterCompiler::new(self.dialect, table);
        let mut clauses = Vec::new();
        if let Some(filter) = filter {
            clauses.extend(compiler.compile(filter)?);
        }
        match self.security(table, variables)? {
            SecurityDecision::Allow => {}
            SecurityDecision::Deny(reason) => return Err(denied(table, kind, reason)),
            SecurityDecision::Filter(tree) => clauses.extend(compiler.compile(&tree)?),
        }

        if clauses.is_empty() {
            warn!(table = %table, kind = %kind, "Write without a filter affects every row");
            return Ok(None);
        }
        Ok(Some(clauses.join(" AND ")))
    }
}

impl<'p, 'a> Builder<'p, 'a> {
    fn new(planner: &'p MutationPlanner<'a>, variables: &'p Variables) -> Self {
        Self {
            planner,
            variables,
            nodes: Vec::new(),
        }
    }

    fn push(
        &mut self,
        table: &str,
        kind: MutationKind,
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
        document: usize,
        projection: Projection,
    ) -> usize {
        let generated_key = self
            .planner
            .schema
            .auto_increment_column(table)
            .map(|c| c.column_name.clone());
        self.nodes.push(WriteNode {
            table: table.to_string(),
            kind,
            columns,
            rows,
            injected: Vec::new(),
            parent: None,
            children: Vec::new(),
            document,
            filter: None,
            returning: projection.fields.clone(),
            generated_key,
            projection,
            sql: String::new(),
        });
        self.nodes.len() - 1
    }

    /// Screen the caller's values, apply overwrites, then separate columns
    /// from joined child documents
    fn split_document(&self, table: &str, mut document: Document) -> StrataResult<SplitDocument> {
        for (key, value) in &document {
            guard::check_str("docs", key)?;
            guard::check_value(key, value)?;
        }

        let schema = self.planner.schema;
        let forced = self
            .planner
            .rules
            .transform
            .overwrite(table, schema.transform_rules.get(table), &document, self.variables)
            .map_err(|e| rule_failure("transform", e))?;
        for (column, value) in forced {
            document.insert(column, value);
        }

        let mut split = SplitDocument {
            columns: Vec::new(),
            children: Vec::new(),
        };
        for (key, value) in document {
            if schema.column(table, &key).is_some() {
                split.columns.push((key, value));
                continue;
            }

            let Some(documents) = child_documents(&value) else {
                ensure_identifier("column", &key)?;
                split.columns.push((key, value));
                continue;
            };

            let child_table = normalize_table(&key);
            match schema.get_join(table, &child_table) {
                Ok(join) => split.children.push(ChildDocuments {
                    key,
                    table: child_table,
                    join,
                    documents,
                }),
                Err(StrataError::JoinNotFound { .. } | StrataError::SchemaNotFound(_))
                    if value.is_array() =>
                {
                    ensure_identifier("column", &key)?;
                    debug!(table = %table, column = %key, "No join for array value, storing it as JSON");
                    split.columns.push((key, value));
                }
                Err(err) => return Err(err),
            }
        }
        Ok(split)
    }

    fn attach_children(
        &mut self,
        parent: usize,
        row: usize,
        group: ChildDocuments,
        document: usize,
    ) -> StrataResult<()> {
        self.planner
            .check_write(&group.table, MutationKind::Insert, self.variables)?;
        let projection = self.nodes[parent].projection.child(&group.key);

        for child_document in group.documents {
            let split = self.split_document(&group.table, child_document)?;
            let mut columns = split.columns;
            let mut injected = Vec::new();

            for (parent_column, child_column) in group.join.pairs() {
                if !columns.iter().any(|(c, _)| c == child_column) {
                    injected.push(InjectedColumn {
                        position: columns.len(),
                        parent_column: parent_column.to_string(),
                    });
                    columns.push((child_column.to_string(), Value::Null));
                }
                let returning = &mut self.nodes[parent].returning;
                if !returning.is_empty() && !returning.iter().any(|c| c == parent_column) {
                    returning.push(parent_column.to_string());
                }
            }

            let (names, values): (Vec<_>, Vec<_>) = columns.into_iter().unzip();
            let id = self.push(
                &group.table,
                MutationKind::Insert,
                names,
                vec![values],
                document,
                projection.clone(),
            );
            self.nodes[id].injected = injected;
            self.nodes[id].parent = Some(ParentLink {
                node: parent,
                row,
                key: group.key.clone(),
            });
            self.nodes[parent].children.push(id);

            for grandchildren in split.children {
                self.attach_children(id, 0, grandchildren, document)?;
            }
            self.finish(id);
        }
        Ok(())
    }

    /// Render the statement once the returning list is final
    fn finish(&mut self, id: usize) {
        let dialect = self.planner.dialect;
        let node = &mut self.nodes[id];
        node.sql = match node.kind {
            MutationKind::Insert => {
                insert_sql(dialect, &node.table, &node.columns, node.rows.len(), &node.returning)
            }
            MutationKind::Update => update_sql(
                dialect,
                &node.table,
                &node.columns,
                node.filter.as_deref(),
                &node.returning,
            ),
            MutationKind::Delete => {
                delete_sql(dialect, &node.table, node.filter.as_deref(), &node.returning)
            }
            MutationKind::InsertSelect => return,
        };
        debug!(table = %node.table, kind = %node.kind, sql = %node.sql, "Planned write");
    }

    fn into_plan(self, kind: MutationKind, table: &str, root: usize, projection: Projection) -> MutationPlan {
        MutationPlan {
            kind,
            table: table.to_string(),
            nodes: self.nodes,
            roots: vec![root],
            projection,
        }
    }
}

fn denied(table: &str, kind: MutationKind, reason: String) -> StrataError {
    StrataError::RuleFailure {
        source_name: "security".to_string(),
        message: format!("{} on `{}` denied: {}", kind, table, reason),
    }
}

fn returning_projection(field: &Field) -> Projection {
    field
        .selection
        .iter()
        .find(|f| f.name == "returning")
        .map(|f| Projection::from_selection(&f.selection))
        .unwrap_or_default()
}

fn required_docs(field: &Field, variables: &Variables) -> StrataResult<Value> {
    field
        .resolved("docs", variables)
        .ok_or_else(|| StrataError::invalid(format!("`{}` requires `docs`", field.name)))
}

fn as_documents(table: &str, docs: &Value) -> StrataResult<Vec<Document>> {
    let documents = match docs {
        Value::Object(map) => vec![map.clone()],
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Object(map) => Ok(map.clone()),
                other => Err(StrataError::invalid(format!(
                    "documents for `{}` must be objects, got {}",
                    table, other
                ))),
            })
            .collect::<StrataResult<Vec<_>>>()?,
        other => {
            return Err(StrataError::invalid(format!(
                "documents for `{}` must be an object or an array, got {}",
                table, other
            )))
        }
    };
    if documents.is_empty() {
        return Err(StrataError::invalid(format!("no documents to insert into `{}`", table)));
    }
    Ok(documents)
}

/// Object or array of objects; anything else is a column value
fn child_documents(value: &Value) -> Option<Vec<Document>> {
    match value {
        Value::Object(map) => Some(vec![map.clone()]),
        Value::Array(items) if items.iter().all(Value::is_object) => Some(
            items
                .iter()
                .filter_map(|item| item.as_object().cloned())
                .collect(),
        ),
        _ => None,
    }
}
