//! Execution layer for strata.
//!
//! - **driver**: `Driver` / `Connection` traits with sqlite, postgres, mysql
//!   and mssql implementations
//! - **pool**: bounded per-source connection pool
//! - **session**: a pooled connection with transaction state and timeouts
//! - **catalog**: data sources, their schema snapshots and introspection
//! - **executor**: runs compiled queries and mutation plans
//! - **orchestrator**: the [`Engine`] that serves whole request documents

pub mod catalog;
pub mod driver;
pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod pool;
pub mod session;

pub use catalog::{Catalog, DataSource, DataSourceStore, MemoryStore};
pub use driver::{open_driver, Connection, Driver};
pub use error::{DriverError, DriverResult};
pub use orchestrator::{Engine, Explained, Request, Response, ResponseError, ResponseStatus};
pub use pool::{Pool, PooledConnection};
pub use session::Session;
