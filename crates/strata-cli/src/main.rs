use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;

mod cli;
mod commands;
mod logging;

use cli::{Cli, Commands};
use strata_config::ConfigLoader;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::load_from_file(&cli.config)
        .await
        .with_context(|| format!("loading config from {}", cli.config.display()))?;

    logging::init(&config.logging, cli.level_override())?;
    debug!(config = %cli.config.display(), sources = config.sources.len(), "Configuration loaded");

    match cli.command {
        Commands::Run {
            request,
            vars,
            single_txn,
        } => commands::run::execute(config, request, vars, single_txn).await,
        Commands::Compile { request, vars } => commands::compile::execute(config, request, vars).await,
        Commands::Introspect { source } => commands::introspect::execute(config, source).await,
    }
}
