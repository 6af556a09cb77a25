//! PostgreSQL MCP Server Library
//!
//! This library serves the tables of one PostgreSQL schema as MCP resources
//! and offers a `query` tool that runs SQL inside read-only transactions.

pub mod config;
pub mod db;
pub mod debug_dump;
pub mod error;
pub mod mcp;
pub mod tools;
pub mod transport;

pub use config::{Config, DatabaseConfig, EnvSource};
pub use error::DbError;
pub use mcp::PostgresService;
