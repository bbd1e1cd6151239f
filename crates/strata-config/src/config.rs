//! Configuration data types
//!
//! Every section implements `Default`, so a config file only needs to name
//! what it changes.

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Dialect identifiers understood by the engine
pub const SUPPORTED_DIALECTS: &[&str] = &["postgres", "mysql", "mssql", "sqlite"];

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StrataConfig {
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
    pub sources: BTreeMap<String, DataSourceConfig>,
}

impl StrataConfig {
    /// Look up a data source by alias
    pub fn source(&self, alias: &str) -> ConfigResult<&DataSourceConfig> {
        self.sources
            .get(alias)
            .ok_or_else(|| ConfigError::UnknownSource(alias.to_string()))
    }

    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> ConfigResult<()> {
        self.engine.validate()?;

        if let Some(default) = &self.engine.default_source {
            if !self.sources.contains_key(default) {
                return Err(ConfigError::Invalid(format!(
                    "engine.default_source `{}` is not a configured source",
                    default
                )));
            }
        }

        for (alias, source) in &self.sources {
            source
                .validate()
                .map_err(|e| ConfigError::Invalid(format!("sources.{}: {}", alias, e)))?;
        }

        Ok(())
    }
}

/// Engine-wide behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Project whose data sources are served
    pub project: String,
    /// Source used when an operation carries no `@source` directive
    pub default_source: Option<String>,
    /// Row limit substituted when a query asks for `limit <= 0`
    pub default_limit: i64,
    /// Ceiling for a single statement
    pub query_timeout_seconds: u64,
}

impl EngineConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_seconds)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.default_limit <= 0 {
            return Err(ConfigError::Invalid(
                "engine.default_limit must be positive".to_string(),
            ));
        }
        if self.query_timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "engine.query_timeout_seconds must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            project: "default".to_string(),
            default_source: None,
            default_limit: 1000,
            query_timeout_seconds: 300,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogFormat {
    #[serde(rename = "json")]
    Json,
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "pretty")]
    Pretty,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// One logical database
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSourceConfig {
    /// Dialect identifier, one of [`SUPPORTED_DIALECTS`]
    pub dialect: String,
    /// Driver connection string
    pub url: String,
    /// Tables moved into the active schema after introspection
    pub tables: Vec<String>,
    /// Activate every discovered table
    pub activate_all: bool,
    pub pool: PoolConfig,
}

impl DataSourceConfig {
    pub fn new(dialect: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            dialect: dialect.into(),
            url: url.into(),
            ..Default::default()
        }
    }

    fn validate(&self) -> ConfigResult<()> {
        if !SUPPORTED_DIALECTS.contains(&self.dialect.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "unknown dialect `{}` (expected one of {})",
                self.dialect,
                SUPPORTED_DIALECTS.join(", ")
            )));
        }
        if self.url.trim().is_empty() {
            return Err(ConfigError::Invalid("url must not be empty".to_string()));
        }
        self.pool.validate()
    }
}

impl Default for DataSourceConfig {
    fn default() -> Self {
        Self {
            dialect: "postgres".to_string(),
            url: String::new(),
            tables: Vec::new(),
            activate_all: false,
            pool: PoolConfig::default(),
        }
    }
}

/// Connection pool sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub max_open: usize,
    pub max_idle: usize,
    pub max_lifetime_seconds: u64,
    pub acquire_timeout_seconds: u64,
}

impl PoolConfig {
    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_seconds)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_seconds)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.max_open == 0 {
            return Err(ConfigError::Invalid(
                "pool.max_open must be at least 1".to_string(),
            ));
        }
        if self.max_idle > self.max_open {
            return Err(ConfigError::Invalid(format!(
                "pool.max_idle ({}) exceeds pool.max_open ({})",
                self.max_idle, self.max_open
            )));
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_open: 16,
            max_idle: 4,
            max_lifetime_seconds: 1800,
            acquire_timeout_seconds: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_config() -> StrataConfig {
        let mut config = StrataConfig::default();
        config
            .sources
            .insert("main".to_string(), DataSourceConfig::new("sqlite", "app.db"));
        config.engine.default_source = Some("main".to_string());
        config
    }

    #[test]
    fn test_defaults_validate() {
        assert!(sqlite_config().validate().is_ok());
    }

    #[test]
    fn test_unknown_dialect_rejected() {
        let mut config = sqlite_config();
        config.sources.get_mut("main").unwrap().dialect = "oracle".to_string();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("unknown dialect `oracle`"));
    }

    #[test]
    fn test_missing_default_source_rejected() {
        let mut config = sqlite_config();
        config.engine.default_source = Some("replica".to_string());

        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_pool_bounds() {
        let mut config = sqlite_config();
        {
            let pool = &mut config.sources.get_mut("main").unwrap().pool;
            pool.max_open = 2;
            pool.max_idle = 3;
        }
        assert!(config.validate().is_err());

        config.sources.get_mut("main").unwrap().pool.max_open = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_source_lookup() {
        let config = sqlite_config();
        assert_eq!(config.source("main").unwrap().dialect, "sqlite");
        assert!(matches!(
            config.source("nope"),
            Err(ConfigError::UnknownSource(_))
        ));
    }
}
