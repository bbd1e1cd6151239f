pub mod compile;
pub mod introspect;
pub mod run;

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::path::Path;
use strata_config::StrataConfig;
use strata_engine::{Engine, Request};

/// Read the request document and its optional variables file
pub(crate) async fn load_request(document: &Path, vars: Option<&Path>) -> Result<Request> {
    let text = tokio::fs::read_to_string(document)
        .await
        .with_context(|| format!("reading request {}", document.display()))?;

    let mut request = Request::new(text);
    if let Some(path) = vars {
        request = request.with_variables(load_variables(path).await?);
    }
    Ok(request)
}

async fn load_variables(path: &Path) -> Result<Map<String, Value>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading variables {}", path.display()))?;
    match serde_json::from_str(&text).with_context(|| format!("parsing variables {}", path.display()))? {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!(
            "variables file {} must hold a JSON object, found {}",
            path.display(),
            kind_of(&other)
        ),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Build the engine and introspect every source
pub(crate) async fn connect(config: &StrataConfig) -> Result<Engine> {
    let engine = Engine::from_config(config).await.context("building engine")?;
    engine.refresh().await.context("introspecting data sources")?;
    Ok(engine)
}

pub(crate) fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
