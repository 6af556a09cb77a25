//! MCP server integration module.
//!
//! This module provides the integration between the MCP protocol and
//! the database layer using the rmcp framework.

pub mod resource;
pub mod service;

pub use resource::{ResourceAddress, TableRef, parse_table_uri};
pub use service::PostgresService;
