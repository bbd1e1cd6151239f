//! # Strata Configuration
//!
//! Typed configuration for the strata query-translation engine: engine-wide
//! limits and timeouts, logging, and one entry per data source with its
//! dialect, connection URL, pool sizing and the tables to activate.
//!
//! ```rust,no_run
//! use strata_config::ConfigLoader;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::load_from_file("strata.toml").await?;
//!     let main = config.source("main")?;
//!     println!("{} -> {}", main.dialect, main.url);
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]

mod config;
mod error;
mod loader;

pub use config::*;
pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigFormat, ConfigLoader};
