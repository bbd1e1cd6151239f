//! Schema metadata and the join graph of a data source.

mod column;
mod join;
mod registry;

pub use column::{ColumnMeta, ForeignKeyRef, NormalizedType};
pub use join::{join_key, JoinKind, TableJoin, JOIN_KEY_SEPARATOR};
pub use registry::{SchemaRegistry, TableColumns};
