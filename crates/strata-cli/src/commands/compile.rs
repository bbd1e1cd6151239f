use anyhow::{Context, Result};
use std::path::PathBuf;
use strata_config::StrataConfig;

/// Print the SQL of each top-level field without running it
pub async fn execute(config: StrataConfig, request: PathBuf, vars: Option<PathBuf>) -> Result<()> {
    let request = super::load_request(&request, vars.as_deref()).await?;
    let engine = super::connect(&config).await?;
    let explained = engine.explain(&request).await.context("compiling request")?;
    super::print_json(&explained)
}
