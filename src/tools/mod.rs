//! MCP tool implementations.
//!
//! - `query`: run one SQL statement in a read-only transaction

pub mod query;

pub use query::{QueryInput, QueryToolHandler};
