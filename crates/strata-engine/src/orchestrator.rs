//! Request orchestration.
//!
//! Top-level fields run strictly in document order. Each field targets one
//! data source: its own `@source`, else the operation's, else the
//! configured default. With `@singleTxn` every source used by the request
//! shares one session and one transaction, opened by the first field that
//! touches the source (queries and raw SQL included) and committed after
//! the last field; the first failure rolls everything back.

use crate::catalog::{Catalog, DataSource};
use crate::executor::{execute_plan, run_query, run_raw, TxnOptions};
use crate::session::Session;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use strata_config::{EngineConfig, StrataConfig};
use strata_core::request::{bind_template, parse_document, resolve_variables, Variables};
use strata_core::rules::Rules;
use strata_core::{
    CompiledQuery, Document, ErrorKind, Field, MutationKind, MutationPlan, MutationPlanner,
    Operation, OperationKind, QueryCompiler, StrataError, StrataResult,
};
use tracing::{debug, error, info, info_span, warn, Instrument};

/// A request document with its variables
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub document: String,
    pub variables: Variables,
    /// Same as `@singleTxn` on a mutation operation
    pub single_txn: bool,
}

impl Request {
    pub fn new(document: impl Into<String>) -> Self {
        Self {
            document: document.into(),
            ..Default::default()
        }
    }

    pub fn with_variables(mut self, variables: Variables) -> Self {
        self.variables = variables;
        self
    }

    pub fn single_txn(mut self) -> Self {
        self.single_txn = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseError {
    pub kind: ErrorKind,
    pub message: String,
    /// Response alias of the failing field
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ResponseError {
    fn new(err: &StrataError, path: Option<&str>) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            path: path.map(String::from),
        }
    }
}

/// Status and message envelope returned for every request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub status: ResponseStatus,
    pub data: Map<String, Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ResponseError>,
}

impl Response {
    fn failure(err: &StrataError) -> Self {
        Self {
            status: ResponseStatus::Error,
            data: Map::new(),
            errors: vec![ResponseError::new(err, None)],
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ResponseStatus::Ok
    }
}

/// SQL a field would run, without executing it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Explained {
    pub alias: String,
    pub source: String,
    pub statements: Vec<String>,
}

/// A field compiled or planned against its source's schema
enum Prepared {
    Query(CompiledQuery),
    Raw {
        sql: String,
        params: Vec<Value>,
        mutation: bool,
    },
    Mutation {
        plan: MutationPlan,
        txn: bool,
    },
}

impl Prepared {
    fn statements(&self) -> Vec<String> {
        match self {
            Self::Query(query) => vec![query.sql.clone()],
            Self::Raw { sql, .. } => vec![sql.clone()],
            Self::Mutation { plan, .. } => plan
                .execution_order()
                .into_iter()
                .filter_map(|id| plan.node(id).map(|n| n.sql.clone()))
                .collect(),
        }
    }
}

/// Outcome of one executed field
enum FieldOutput {
    Rows(Vec<Value>),
    Mutation {
        rows: Vec<Value>,
        errors: Vec<StrataError>,
    },
}

/// One field scheduled for execution
struct Unit<'d> {
    operation: &'d Operation,
    field: &'d Field,
    variables: Variables,
    source: String,
}

pub struct Engine {
    catalog: Arc<Catalog>,
    rules: Rules,
    default_source: Option<String>,
    default_limit: i64,
    query_timeout: Duration,
}

impl Engine {
    pub fn new(catalog: Arc<Catalog>, config: &EngineConfig) -> Self {
        Self {
            catalog,
            rules: Rules::default(),
            default_source: config.default_source.clone(),
            default_limit: config.default_limit,
            query_timeout: config.query_timeout(),
        }
    }

    /// Build every configured data source; schemas stay empty until
    /// [`refresh`](Self::refresh) runs
    pub async fn from_config(config: &StrataConfig) -> StrataResult<Self> {
        let catalog = Catalog::from_config(config).await?;
        Ok(Self::new(Arc::new(catalog), &config.engine))
    }

    pub fn with_rules(mut self, rules: Rules) -> Self {
        self.rules = rules;
        self
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Introspect every data source
    pub async fn refresh(&self) -> StrataResult<()> {
        self.catalog.refresh_all(self.query_timeout).await
    }

    pub async fn execute(&self, request: Request) -> Response {
        let document = match parse_document(&request.document) {
            Ok(document) => document,
            Err(e) => {
                warn!(error = %e, "Rejected request document");
                return Response::failure(&e);
            }
        };
        let units = match self.schedule(&document, &request.variables) {
            Ok(units) => units,
            Err(e) => return Response::failure(&e),
        };
        let single_txn = request.single_txn
            || document
                .operations
                .iter()
                .any(|op| op.kind == OperationKind::Mutation && op.has_directive("singleTxn"));

        info!(fields = units.len(), single_txn, "Executing request");
        if single_txn {
            self.execute_shared(&document, &request.variables, units).await
        } else {
            self.execute_independent(&document, &request.variables, units).await
        }
    }

    /// Compile and plan every field without running anything
    pub async fn explain(&self, request: &Request) -> StrataResult<Vec<Explained>> {
        let document = parse_document(&request.document)?;
        let mut explained = Vec::new();
        for unit in self.schedule(&document, &request.variables)? {
            let source = self.catalog.source(&unit.source).await?;
            let prepared = self.prepare(&document, &request.variables, &unit, &source)?;
            explained.push(Explained {
                alias: unit.field.output_name().to_string(),
                source: unit.source.clone(),
                statements: prepared.statements(),
            });
        }
        Ok(explained)
    }

    /// Order fields for execution, leaving out named queries that only
    /// feed `insertselect_*` fields
    fn schedule<'d>(&self, document: &'d Document, supplied: &Variables) -> StrataResult<Vec<Unit<'d>>> {
        let mut upstream: HashSet<String> = HashSet::new();
        for operation in &document.operations {
            let variables = resolve_variables(operation, supplied);
            for field in &operation.selection {
                if let Some((MutationKind::InsertSelect, _)) = MutationKind::from_field_name(&field.name) {
                    if let Some(Value::String(name)) = field.resolved("select", &variables) {
                        upstream.insert(name);
                    }
                }
            }
        }

        let mut units = Vec::new();
        for operation in &document.operations {
            if operation.name.as_ref().is_some_and(|n| upstream.contains(n)) {
                debug!(operation = ?operation.name, "Skipping named query used as insert source");
                continue;
            }
            let variables = resolve_variables(operation, supplied);
            for field in &operation.selection {
                let source = self.source_for(operation, field, &variables)?;
                units.push(Unit {
                    operation,
                    field,
                    variables: variables.clone(),
                    source,
                });
            }
        }
        Ok(units)
    }

    fn source_for(&self, operation: &Operation, field: &Field, variables: &Variables) -> StrataResult<String> {
        let named = |directive: Option<&strata_core::request::Directive>| {
            directive
                .and_then(|d| d.argument("name"))
                .and_then(|v| v.resolve(variables))
                .and_then(|v| v.as_str().map(String::from))
        };
        named(field.directive("source"))
            .or_else(|| named(operation.directive("source")))
            .or_else(|| self.default_source.clone())
            .ok_or_else(|| {
                StrataError::invalid(format!(
                    "`{}` names no @source and no default source is configured",
                    field.output_name()
                ))
            })
    }

    fn prepare(
        &self,
        document: &Document,
        supplied: &Variables,
        unit: &Unit<'_>,
        source: &DataSource,
    ) -> StrataResult<Prepared> {
        let schema = source.schema();
        let dialect = source.dialect().as_ref();
        let field = unit.field;
        let variables = &unit.variables;
        let mutation = unit.operation.kind == OperationKind::Mutation;

        if field.name == "sql" {
            let Some(Value::String(text)) = field.resolved("query", variables) else {
                return Err(StrataError::invalid("`sql` requires a string `query` argument"));
            };
            let (sql, params) = bind_template(&text, variables, dialect)?;
            return Ok(Prepared::Raw {
                sql,
                params,
                mutation,
            });
        }

        let compiler = QueryCompiler::new(&schema, dialect)
            .with_rules(self.rules.clone())
            .with_default_limit(self.default_limit);
        if !mutation {
            return Ok(Prepared::Query(compiler.compile(field, variables)?));
        }

        let txn = match field.resolved("txn", variables) {
            None => false,
            Some(Value::Bool(b)) => b,
            Some(other) => {
                return Err(StrataError::invalid(format!(
                    "`txn` must be a boolean, got {}",
                    other
                )))
            }
        };
        let planner = MutationPlanner::new(&schema, dialect).with_rules(self.rules.clone());
        let plan = match MutationKind::from_field_name(&field.name) {
            Some((MutationKind::InsertSelect, _)) => {
                let Some(Value::String(name)) = field.resolved("select", variables) else {
                    return Err(StrataError::invalid(format!(
                        "`{}` requires a `select` naming a query",
                        field.name
                    )));
                };
                let upstream = document
                    .operation(&name)
                    .filter(|op| op.kind == OperationKind::Query)
                    .ok_or_else(|| StrataError::invalid(format!("no query named `{}`", name)))?;
                let upstream_field = upstream
                    .selection
                    .first()
                    .ok_or_else(|| StrataError::invalid(format!("query `{}` selects nothing", name)))?;
                let upstream_variables = resolve_variables(upstream, supplied);
                let query = compiler.compile_unlimited(upstream_field, &upstream_variables)?;
                planner.plan_insert_select(field, &query, variables)?
            }
            _ => planner.plan(field, variables)?,
        };
        Ok(Prepared::Mutation { plan, txn })
    }

    async fn run_prepared(
        &self,
        session: &mut Session,
        source: &DataSource,
        prepared: &Prepared,
        single_txn: bool,
    ) -> StrataResult<FieldOutput> {
        match prepared {
            Prepared::Query(query) => {
                let schema = source.schema();
                Ok(FieldOutput::Rows(run_query(session, query, &schema, &self.rules).await?))
            }
            Prepared::Raw { sql, params, mutation } => {
                let rows = run_raw(session, sql, params).await?;
                Ok(if *mutation {
                    FieldOutput::Mutation {
                        rows,
                        errors: Vec::new(),
                    }
                } else {
                    FieldOutput::Rows(rows)
                })
            }
            Prepared::Mutation { plan, txn } => {
                let options = TxnOptions {
                    open_txn: single_txn && !session.in_transaction(),
                    close_txn: false,
                    txn: *txn,
                    single_txn,
                };
                let outcome = execute_plan(session, plan, options).await?;
                Ok(FieldOutput::Mutation {
                    rows: outcome.rows,
                    errors: outcome.errors,
                })
            }
        }
    }

    /// Every field on its own connection; failures stay local
    async fn execute_independent(
        &self,
        document: &Document,
        supplied: &Variables,
        units: Vec<Unit<'_>>,
    ) -> Response {
        let mut data = Map::new();
        let mut errors = Vec::new();

        for unit in &units {
            let alias = unit.field.output_name();
            let span = info_span!("operation", alias = %alias, source = %unit.source);
            let result = async {
                let source = self.catalog.source(&unit.source).await?;
                let prepared = self.prepare(document, supplied, unit, &source)?;
                let mut session = source.session(self.query_timeout).await?;
                self.run_prepared(&mut session, &source, &prepared, false).await
            }
            .instrument(span)
            .await;

            match result {
                Ok(FieldOutput::Rows(rows)) => merge_rows(&mut data, alias, rows),
                Ok(FieldOutput::Mutation { rows, errors: nested }) => {
                    let message = join_messages(&nested);
                    for e in &nested {
                        errors.push(ResponseError::new(e, Some(alias)));
                    }
                    data.insert(
                        alias.to_string(),
                        mutation_payload(unit.field, Value::Array(rows), message),
                    );
                }
                Err(e) => {
                    error!(alias = %alias, error = %e, "Operation failed");
                    if unit.operation.kind == OperationKind::Mutation {
                        data.insert(
                            alias.to_string(),
                            mutation_payload(unit.field, Value::Array(Vec::new()), Some(e.to_string())),
                        );
                    }
                    errors.push(ResponseError::new(&e, Some(alias)));
                }
            }
        }

        Response {
            status: if errors.is_empty() {
                ResponseStatus::Ok
            } else {
                ResponseStatus::Error
            },
            data,
            errors,
        }
    }

    /// One session per source, one transaction across the request
    async fn execute_shared(
        &self,
        document: &Document,
        supplied: &Variables,
        units: Vec<Unit<'_>>,
    ) -> Response {
        let mut data = Map::new();
        let mut sessions: HashMap<String, Session> = HashMap::new();
        let mut failure: Option<(StrataError, Option<String>)> = None;

        for unit in &units {
            let alias = unit.field.output_name();
            let span = info_span!("operation", alias = %alias, source = %unit.source);
            let result = async {
                let source = self.catalog.source(&unit.source).await?;
                let prepared = self.prepare(document, supplied, unit, &source)?;
                let session = match sessions.entry(unit.source.clone()) {
                    Entry::Occupied(entry) => entry.into_mut(),
                    Entry::Vacant(entry) => entry.insert(source.session(self.query_timeout).await?),
                };
                // the first field on each source opens its transaction,
                // whatever kind of statement it runs
                if !session.in_transaction() {
                    session.begin().await?;
                }
                self.run_prepared(session, &source, &prepared, true).await
            }
            .instrument(span)
            .await;

            match result {
                Ok(FieldOutput::Rows(rows)) => merge_rows(&mut data, alias, rows),
                Ok(FieldOutput::Mutation { rows, .. }) => {
                    data.insert(
                        alias.to_string(),
                        mutation_payload(unit.field, Value::Array(rows), None),
                    );
                }
                Err(e) => {
                    error!(alias = %alias, error = %e, "Operation failed; rolling back request");
                    if unit.operation.kind == OperationKind::Mutation {
                        data.insert(
                            alias.to_string(),
                            mutation_payload(unit.field, Value::Array(Vec::new()), Some(e.to_string())),
                        );
                    }
                    failure = Some((e, Some(alias.to_string())));
                    break;
                }
            }
        }

        if failure.is_none() {
            for (alias, session) in sessions.iter_mut() {
                if let Err(e) = session.commit(1).await {
                    error!(source = %alias, error = %e, "Commit failed");
                    failure = Some((e, None));
                    break;
                }
            }
        }

        let Some((err, path)) = failure else {
            return Response {
                status: ResponseStatus::Ok,
                data,
                errors: Vec::new(),
            };
        };

        for session in sessions.values_mut() {
            let _ = session.rollback().await;
        }
        for unit in &units {
            if unit.operation.kind != OperationKind::Mutation {
                continue;
            }
            if let Some(Value::Object(payload)) = data.get_mut(unit.field.output_name()) {
                if payload.contains_key("returning") {
                    payload.insert("returning".to_string(), Value::Object(Map::new()));
                }
            }
        }

        Response {
            status: ResponseStatus::Error,
            data,
            errors: vec![ResponseError {
                kind: err.kind(),
                message: format!("transaction rolled back: {}", err),
                path,
            }],
        }
    }
}

/// Query rows under an alias accumulate across fields
fn merge_rows(data: &mut Map<String, Value>, alias: &str, rows: Vec<Value>) {
    match data
        .entry(alias.to_string())
        .or_insert_with(|| Value::Array(Vec::new()))
    {
        Value::Array(items) => items.extend(rows),
        other => *other = Value::Array(rows),
    }
}

fn join_messages(errors: &[StrataError]) -> Option<String> {
    if errors.is_empty() {
        return None;
    }
    Some(
        errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; "),
    )
}

/// `{returning, error}` limited to what the field selected; both when it
/// selected neither
fn mutation_payload(field: &Field, returning: Value, error: Option<String>) -> Value {
    let wants = |name: &str| field.selection.iter().any(|f| f.name == name);
    let (with_returning, with_error) = match (wants("returning"), wants("error")) {
        (false, false) => (true, true),
        selected => selected,
    };

    let mut payload = Map::new();
    if with_error {
        payload.insert(
            "error".to_string(),
            error.map(Value::String).unwrap_or(Value::Null),
        );
    }
    if with_returning {
        payload.insert("returning".to_string(), returning);
    }
    Value::Object(payload)
}
