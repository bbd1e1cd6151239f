//! Subscriber setup. Logs go to stderr so stdout stays plain JSON.

use anyhow::{anyhow, Result};
use strata_config::{LogFormat, LoggingConfig};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

pub fn init(config: &LoggingConfig, level: Option<LevelFilter>) -> Result<()> {
    let filter = filter_for(config, level)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let installed = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Text => builder.try_init(),
    };
    installed.map_err(|e| anyhow!("failed to install log subscriber: {}", e))
}

/// The flag level wins, then `RUST_LOG`, then the config file
fn filter_for(config: &LoggingConfig, level: Option<LevelFilter>) -> Result<EnvFilter> {
    if let Some(level) = level {
        return Ok(EnvFilter::new(directive(&level.to_string().to_lowercase())));
    }
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(directive(&config.level))
        .map_err(|e| anyhow!("invalid log level {:?}: {}", config.level, e))
}

fn directive(level: &str) -> String {
    format!("strata_cli={level},strata_engine={level},strata_core={level},strata_config={level}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directive_covers_workspace_crates() {
        let d = directive("debug");
        assert!(d.contains("strata_engine=debug"));
        assert!(d.contains("strata_core=debug"));
    }

    #[test]
    fn test_flag_level_overrides_config() {
        let config = LoggingConfig {
            level: "not-a-level!!".to_string(),
            format: LogFormat::Text,
        };
        let filter = filter_for(&config, Some(LevelFilter::TRACE)).unwrap();
        assert!(filter.to_string().contains("strata_engine=trace"));
    }
}
