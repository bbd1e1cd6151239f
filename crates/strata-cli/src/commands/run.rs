use anyhow::Result;
use std::path::PathBuf;
use strata_config::StrataConfig;
use tracing::info;

/// Execute a request and print the response envelope
pub async fn execute(
    config: StrataConfig,
    request: PathBuf,
    vars: Option<PathBuf>,
    single_txn: bool,
) -> Result<()> {
    let mut request = super::load_request(&request, vars.as_deref()).await?;
    if single_txn {
        request = request.single_txn();
    }

    let engine = super::connect(&config).await?;
    let response = engine.execute(request).await;
    info!(ok = response.is_ok(), fields = response.data.len(), "Request finished");

    super::print_json(&response)?;
    if !response.is_ok() {
        std::process::exit(1);
    }
    Ok(())
}
