//! Request-to-SQL translation core for strata.
//!
//! This crate performs no I/O. It owns:
//!
//! - **schema**: column metadata and the join graph of a data source
//! - **dialect**: per-engine SQL syntax (limits, placeholders, introspection)
//! - **request**: the GraphQL-style request document and its parser
//! - **compile**: nested selection -> one flat `SELECT` with wire-encoded aliases
//! - **assemble**: flat rows -> the nested object graph the caller asked for
//! - **mutation**: nested documents -> a tree of dependent write statements
//! - **rules**: contracts for the security, transform and expression collaborators
//!
//! Everything that touches a connection lives in `strata-engine`.

pub mod assemble;
pub mod compile;
pub mod dialect;
pub mod error;
pub mod guard;
pub mod ident;
pub mod mutation;
pub mod request;
pub mod rules;
pub mod schema;
pub mod value;

pub use compile::{CompiledQuery, QueryCompiler, TableRegistry};
pub use dialect::{DialectRegistry, SqlDialect};
pub use error::{ErrorKind, StrataError, StrataResult};
pub use mutation::{MutationKind, MutationPlan, MutationPlanner};
pub use request::{Document, Field, Operation, OperationKind};
pub use schema::{ColumnMeta, SchemaRegistry, TableJoin};
pub use value::{Cell, ColumnInfo, ResultSet};
