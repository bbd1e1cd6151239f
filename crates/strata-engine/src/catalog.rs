//! Data sources and their schemas.
//!
//! A [`DataSource`] owns the pool and the schema snapshot for one logical
//! database. Requests take an `Arc<SchemaRegistry>` snapshot up front;
//! introspection builds a new registry off to the side and swaps it in, so
//! no lock is held across I/O.

use crate::driver::open_driver;
use crate::pool::Pool;
use crate::session::Session;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use strata_config::{DataSourceConfig, StrataConfig};
use strata_core::dialect::METADATA_COLUMNS;
use strata_core::ident::normalize_table;
use strata_core::schema::ForeignKeyRef;
use strata_core::{
    Cell, ColumnMeta, DialectRegistry, ResultSet, SchemaRegistry, SqlDialect, StrataError,
    StrataResult,
};
use tracing::{debug, info, warn};

pub struct DataSource {
    pub alias: String,
    pub config: DataSourceConfig,
    dialect: Arc<dyn SqlDialect>,
    pool: Pool,
    schema: RwLock<Arc<SchemaRegistry>>,
    /// Result of the last liveness probe
    connected: AtomicBool,
}

impl std::fmt::Debug for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSource")
            .field("alias", &self.alias)
            .field("dialect", &self.dialect.name())
            .field("pool", &self.pool)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl DataSource {
    pub fn new(
        alias: impl Into<String>,
        config: DataSourceConfig,
        dialects: &DialectRegistry,
    ) -> StrataResult<Self> {
        let dialect = dialects.get(&config.dialect)?;
        let driver = open_driver(&config.dialect, &config.url).map_err(|e| e.into_strata(0))?;
        let pool = Pool::new(driver, &config.pool);
        Ok(Self {
            alias: alias.into(),
            config,
            dialect,
            pool,
            schema: RwLock::new(Arc::new(SchemaRegistry::default())),
            connected: AtomicBool::new(false),
        })
    }

    /// Replace the schema with a hand-built one
    pub fn with_schema(self, schema: SchemaRegistry) -> Self {
        *self.schema.write() = Arc::new(schema);
        self
    }

    pub fn dialect(&self) -> &Arc<dyn SqlDialect> {
        &self.dialect
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Consistent view of the schema for one request
    pub fn schema(&self) -> Arc<SchemaRegistry> {
        self.schema.read().clone()
    }

    /// Edit a copy of the schema and swap it in when `f` succeeds
    pub fn update_schema<R>(
        &self,
        f: impl FnOnce(&mut SchemaRegistry) -> StrataResult<R>,
    ) -> StrataResult<R> {
        let mut next = (*self.schema()).clone();
        let result = f(&mut next)?;
        *self.schema.write() = Arc::new(next);
        Ok(result)
    }

    pub async fn session(&self, timeout: Duration) -> StrataResult<Session> {
        let conn = self.pool.acquire().await?;
        Ok(Session::new(conn, self.dialect.clone(), timeout))
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Run the dialect's liveness probe and record the outcome
    pub async fn ping(&self, timeout: Duration) -> StrataResult<()> {
        let probe = async {
            let mut session = self.session(timeout).await?;
            session.query(self.dialect.probe_query(), &[], 0).await
        }
        .await;
        self.connected.store(probe.is_ok(), Ordering::Relaxed);
        match probe {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(source = %self.alias, error = %e, "Liveness probe failed");
                Err(StrataError::ConnectionUnavailable(e.to_string()))
            }
        }
    }

    /// Introspect the database and activate the configured tables
    pub async fn refresh(&self, timeout: Duration) -> StrataResult<()> {
        info!(source = %self.alias, dialect = self.dialect.name(), "Introspecting data source");
        self.ping(timeout).await?;
        let mut session = self.session(timeout).await?;

        let schema_rows = session
            .query(self.dialect.default_schema_query(), &[], 0)
            .await?;
        let default_schema = schema_rows
            .rows
            .first()
            .and_then(|row| row.first())
            .and_then(cell_text)
            .unwrap_or_default();

        let metadata = session.query(self.dialect.metadata_query(), &[], 0).await?;
        drop(session);
        let columns = decode_metadata(&metadata, self.dialect.as_ref())?;
        debug!(source = %self.alias, columns = columns.len(), "Read column metadata");

        let config = &self.config;
        self.update_schema(|schema| {
            schema.default_schema = default_schema;
            schema.capture_columns(columns);

            let tables: Vec<String> = if config.activate_all {
                schema
                    .other_tables
                    .keys()
                    .chain(schema.schema_tables.keys())
                    .cloned()
                    .collect()
            } else {
                config.tables.iter().map(|t| normalize_table(t)).collect()
            };
            for table in &tables {
                schema.activate_table(table)?;
            }
            info!(
                active = schema.schema_tables.len(),
                inactive = schema.other_tables.len(),
                joins = schema.table_joins.len(),
                "Schema refreshed"
            );
            Ok(())
        })
    }
}

fn cell_text(cell: &Cell) -> Option<String> {
    match cell {
        Cell::Null => None,
        Cell::Text(s) => Some(s.clone()),
        Cell::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
        Cell::Int(i) => Some(i.to_string()),
        Cell::Float(f) => Some(f.to_string()),
        Cell::Bool(b) => Some(b.to_string()),
        Cell::Json(v) => Some(v.to_string()),
        other => Some(format!("{:?}", other)),
    }
}

fn cell_bool(cell: &Cell) -> bool {
    match cell {
        Cell::Bool(b) => *b,
        Cell::Int(i) => *i != 0,
        Cell::Float(f) => *f != 0.0,
        other => matches!(
            cell_text(other).map(|s| s.trim().to_ascii_uppercase()).as_deref(),
            Some("YES" | "TRUE" | "T" | "1")
        ),
    }
}

fn cell_int(cell: &Cell) -> Option<i64> {
    match cell {
        Cell::Int(i) => Some(*i),
        Cell::Float(f) => Some(*f as i64),
        other => cell_text(other).and_then(|s| s.trim().parse().ok()),
    }
}

/// Turn rows of the dialect metadata query into column records
fn decode_metadata(result: &ResultSet, dialect: &dyn SqlDialect) -> StrataResult<Vec<ColumnMeta>> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    for name in METADATA_COLUMNS {
        let position = result
            .columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                StrataError::invalid(format!("metadata query did not return `{}`", name))
            })?;
        index.insert(name, position);
    }

    let mut columns = Vec::with_capacity(result.rows.len());
    for row in &result.rows {
        let get = |name: &str| &row[index[name]];
        let text = |name: &str| cell_text(get(name));

        let (Some(table_name), Some(column_name)) = (text("table_name"), text("column_name")) else {
            continue;
        };
        let native_type = text("data_type").unwrap_or_default();

        let foreign_key = match (text("ref_table_name"), text("ref_column_name")) {
            (Some(table), Some(column)) => Some(ForeignKeyRef {
                schema_name: text("ref_table_schema").unwrap_or_default(),
                table_name: table,
                column_name: column,
                delete_rule: text("delete_rule"),
            }),
            (Some(table), None) => {
                warn!(
                    table = %table_name,
                    column = %column_name,
                    references = %table,
                    "Foreign key without a target column skipped"
                );
                None
            }
            _ => None,
        };

        columns.push(ColumnMeta {
            schema_name: text("table_schema").unwrap_or_default(),
            normalized_type: dialect.map_native_type(&native_type),
            native_type,
            is_primary_key: cell_bool(get("is_primary_key")),
            is_unique: cell_bool(get("is_unique")),
            is_nullable: cell_bool(get("is_nullable")),
            constraint_name: text("constraint_name"),
            ordinal_position: cell_int(get("ordinal_position")).unwrap_or_default(),
            default_value: text("column_default"),
            is_auto_increment: cell_bool(get("is_auto_increment")),
            max_length: cell_int(get("max_length")),
            numeric_precision: cell_int(get("numeric_precision")),
            numeric_scale: cell_int(get("numeric_scale")),
            foreign_key,
            masking_rule: None,
            table_name,
            column_name,
        });
    }
    Ok(columns)
}

/// Where data sources of a project are kept
#[async_trait]
pub trait DataSourceStore: Send + Sync {
    async fn get_data_source(&self, project: &str, alias: &str) -> StrataResult<Arc<DataSource>>;

    async fn save_data_source(&self, project: &str, source: Arc<DataSource>) -> StrataResult<()>;

    async fn list_data_sources(&self, project: &str) -> StrataResult<Vec<String>>;
}

/// Process-local store
#[derive(Default)]
pub struct MemoryStore {
    sources: RwLock<BTreeMap<(String, String), Arc<DataSource>>>,
}

#[async_trait]
impl DataSourceStore for MemoryStore {
    async fn get_data_source(&self, project: &str, alias: &str) -> StrataResult<Arc<DataSource>> {
        self.sources
            .read()
            .get(&(project.to_string(), alias.to_string()))
            .cloned()
            .ok_or_else(|| StrataError::SchemaNotFound(format!("data source `{}`", alias)))
    }

    async fn save_data_source(&self, project: &str, source: Arc<DataSource>) -> StrataResult<()> {
        self.sources
            .write()
            .insert((project.to_string(), source.alias.clone()), source);
        Ok(())
    }

    async fn list_data_sources(&self, project: &str) -> StrataResult<Vec<String>> {
        Ok(self
            .sources
            .read()
            .keys()
            .filter(|(p, _)| p == project)
            .map(|(_, alias)| alias.clone())
            .collect())
    }
}

/// The data sources served for one project
pub struct Catalog {
    project: String,
    store: Arc<dyn DataSourceStore>,
}

impl Catalog {
    pub fn new(project: impl Into<String>, store: Arc<dyn DataSourceStore>) -> Self {
        Self {
            project: project.into(),
            store,
        }
    }

    /// Build every configured source into a [`MemoryStore`]
    pub async fn from_config(config: &StrataConfig) -> StrataResult<Self> {
        config
            .validate()
            .map_err(|e| StrataError::invalid(e.to_string()))?;
        let dialects = DialectRegistry::with_defaults();
        let catalog = Self::new(config.engine.project.clone(), Arc::new(MemoryStore::default()));
        for (alias, source) in &config.sources {
            catalog
                .add(DataSource::new(alias.clone(), source.clone(), &dialects)?)
                .await?;
        }
        Ok(catalog)
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub async fn add(&self, source: DataSource) -> StrataResult<Arc<DataSource>> {
        let source = Arc::new(source);
        self.store
            .save_data_source(&self.project, source.clone())
            .await?;
        Ok(source)
    }

    pub async fn source(&self, alias: &str) -> StrataResult<Arc<DataSource>> {
        self.store.get_data_source(&self.project, alias).await
    }

    pub async fn aliases(&self) -> StrataResult<Vec<String>> {
        self.store.list_data_sources(&self.project).await
    }

    pub async fn refresh(&self, alias: &str, timeout: Duration) -> StrataResult<()> {
        self.source(alias).await?.refresh(timeout).await
    }

    pub async fn refresh_all(&self, timeout: Duration) -> StrataResult<()> {
        for alias in self.aliases().await? {
            self.refresh(&alias, timeout).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::dialect::Sqlite;
    use strata_core::ColumnInfo;
    use strata_core::schema::NormalizedType;

    fn metadata(rows: Vec<Vec<Cell>>) -> ResultSet {
        ResultSet {
            columns: METADATA_COLUMNS
                .iter()
                .map(|n| ColumnInfo::new(*n, "", NormalizedType::String))
                .collect(),
            rows,
            ..Default::default()
        }
    }

    fn row(table: &str, column: &str, pk: bool, fk: Option<(&str, Option<&str>)>) -> Vec<Cell> {
        let text = |s: &str| Cell::Text(s.to_string());
        let (ref_table, ref_column) = match fk {
            Some((t, c)) => (text(t), c.map(text).unwrap_or(Cell::Null)),
            None => (Cell::Null, Cell::Null),
        };
        vec![
            text("main"),
            text(table),
            text(column),
            text("INTEGER"),
            Cell::Int(pk as i64),
            Cell::Int(pk as i64),
            text(if pk { "NO" } else { "YES" }),
            Cell::Null,
            Cell::Int(1),
            Cell::Null,
            Cell::Bool(pk),
            Cell::Null,
            Cell::Text("10".to_string()),
            Cell::Null,
            if matches!(ref_table, Cell::Null) { Cell::Null } else { text("main") },
            ref_table,
            ref_column,
            Cell::Null,
        ]
    }

    #[test]
    fn test_decode_metadata_rows() {
        let result = metadata(vec![
            row("users", "id", true, None),
            row("orders", "user_id", false, Some(("users", Some("id")))),
        ]);
        let columns = decode_metadata(&result, &Sqlite).unwrap();

        assert_eq!(columns.len(), 2);
        assert!(columns[0].is_primary_key);
        assert!(!columns[0].is_nullable);
        assert!(columns[0].is_auto_increment);
        assert_eq!(columns[0].normalized_type, NormalizedType::Integer);
        assert_eq!(columns[0].numeric_precision, Some(10));
        assert!(columns[1].is_nullable);

        let fk = columns[1].foreign_key.as_ref().unwrap();
        assert_eq!(fk.table_name, "users");
        assert_eq!(fk.column_name, "id");
    }

    #[test]
    fn test_foreign_key_without_target_column_is_skipped() {
        let result = metadata(vec![row("orders", "user_id", false, Some(("users", None)))]);
        let columns = decode_metadata(&result, &Sqlite).unwrap();
        assert!(columns[0].foreign_key.is_none());
    }

    #[test]
    fn test_missing_metadata_column_rejected() {
        let mut result = metadata(vec![]);
        result.columns.pop();
        assert!(decode_metadata(&result, &Sqlite).is_err());
    }
}
