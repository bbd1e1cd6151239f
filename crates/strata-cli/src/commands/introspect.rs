use anyhow::Result;
use serde_json::{Map, Value};
use strata_config::StrataConfig;

/// Print the active schema and joins, keyed by source alias
pub async fn execute(config: StrataConfig, source: Option<String>) -> Result<()> {
    let engine = super::connect(&config).await?;
    let catalog = engine.catalog();

    let aliases = match source {
        Some(alias) => vec![alias],
        None => catalog.aliases().await?,
    };

    let mut out = Map::new();
    for alias in aliases {
        let source = catalog.source(&alias).await?;
        let schema = source.schema();
        let mut entry = Map::new();
        entry.insert("dialect".to_string(), Value::from(source.config.dialect.clone()));
        entry.insert("connected".to_string(), Value::from(source.is_connected()));
        entry.insert("schema".to_string(), serde_json::to_value(schema.as_ref())?);
        out.insert(alias, Value::Object(entry));
    }
    super::print_json(&out)
}
