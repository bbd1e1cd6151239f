//! Run compiled queries and mutation plans over a [`Session`](crate::session::Session).

mod mutation;
mod query;

pub use mutation::{execute_plan, MutationOutcome, TxnOptions};
pub use query::{run_query, run_raw};
