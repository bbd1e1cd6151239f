//! Config file loading
//!
//! The format is chosen from the file extension: `.toml` or `.json`.

use crate::config::StrataConfig;
use crate::error::{ConfigError, ConfigResult};
use std::path::Path;
use tracing::{debug, info};

/// Supported on-disk formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(Self::Toml),
            Some("json") => Ok(Self::Json),
            other => Err(ConfigError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }
}

/// Loads and validates [`StrataConfig`]
pub struct ConfigLoader;

impl ConfigLoader {
    /// Read, parse and validate a config file
    pub async fn load_from_file(path: impl AsRef<Path>) -> ConfigResult<StrataConfig> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;

        debug!(path = %path.display(), ?format, "Loading config");
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        let config = Self::parse_str(&contents, format)?;
        info!(
            path = %path.display(),
            sources = config.sources.len(),
            "Config loaded"
        );
        Ok(config)
    }

    /// Parse and validate config text in the given format
    pub fn parse_str(contents: &str, format: ConfigFormat) -> ConfigResult<StrataConfig> {
        let config: StrataConfig = match format {
            #[cfg(feature = "toml")]
            ConfigFormat::Toml => {
                toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))?
            }
            #[cfg(not(feature = "toml"))]
            ConfigFormat::Toml => {
                return Err(ConfigError::UnsupportedFormat("toml".to_string()));
            }
            ConfigFormat::Json => {
                serde_json::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))?
            }
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            ConfigFormat::from_path(&PathBuf::from("a/strata.toml")).unwrap(),
            ConfigFormat::Toml
        );
        assert_eq!(
            ConfigFormat::from_path(&PathBuf::from("strata.json")).unwrap(),
            ConfigFormat::Json
        );
        assert!(ConfigFormat::from_path(&PathBuf::from("strata.yaml")).is_err());
        assert!(ConfigFormat::from_path(&PathBuf::from("strata")).is_err());
    }

    #[test]
    fn test_parse_json() {
        let config = ConfigLoader::parse_str(
            r#"{"sources": {"main": {"dialect": "mysql", "url": "mysql://localhost/app"}}}"#,
            ConfigFormat::Json,
        )
        .unwrap();

        let main = config.source("main").unwrap();
        assert_eq!(main.dialect, "mysql");
        assert_eq!(main.pool.max_open, 16);
        assert_eq!(config.engine.default_limit, 1000);
    }

    #[test]
    fn test_parse_rejects_invalid() {
        let result = ConfigLoader::parse_str(
            r#"{"sources": {"main": {"dialect": "mysql", "url": ""}}}"#,
            ConfigFormat::Json,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }
}
