//! Database access layer.
//!
//! - Connection pool construction
//! - The read-only query guard
//! - Schema introspection
//! - Row to JSON conversion

pub mod guard;
pub mod pool;
pub mod schema;
pub mod types;

pub use guard::{JsonRow, QueryGuard, ReadOnlySession, SessionPool};
pub use pool::{connect_options, create_pool};
pub use schema::{ColumnInfo, SchemaInspector};
