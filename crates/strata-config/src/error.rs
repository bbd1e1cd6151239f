//! Configuration errors

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file extension does not map to a known format
    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),

    /// The file contents could not be deserialized
    #[error("Failed to parse config: {0}")]
    Parse(String),

    /// The configuration parsed but is not usable
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// A data source alias was requested that is not configured
    #[error("Data source not configured: {0}")]
    UnknownSource(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
