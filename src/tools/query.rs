//! Query execution tool.
//!
//! This module implements the `query` MCP tool. Statements are not inspected
//! here; [`QueryGuard`] runs them in a read-only transaction and PostgreSQL
//! rejects anything that writes.

use crate::db::guard::{JsonRow, QueryGuard, SessionPool};
use crate::error::{DbError, DbResult};
use schemars::JsonSchema;
use serde::Deserialize;
use std::time::Instant;
use tracing::info;

/// Input for the query tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct QueryInput {
    /// A single SQL statement, run read-only
    pub sql: String,
}

/// Handler for query execution.
pub struct QueryToolHandler<'a, P> {
    pool: &'a P,
}

impl<'a, P: SessionPool> QueryToolHandler<'a, P> {
    pub fn new(pool: &'a P) -> Self {
        Self { pool }
    }

    /// Run the statement and return its rows.
    pub async fn query(&self, input: QueryInput) -> DbResult<Vec<JsonRow>> {
        let start = Instant::now();
        let rows = QueryGuard::execute(self.pool, &input.sql).await?;

        info!(
            row_count = rows.len(),
            execution_time_ms = start.elapsed().as_millis() as u64,
            "Query executed"
        );
        Ok(rows)
    }

    /// Run the statement and render its rows as pretty-printed JSON.
    pub async fn query_text(&self, input: QueryInput) -> DbResult<String> {
        let rows = self.query(input).await?;
        serde_json::to_string_pretty(&rows)
            .map_err(|e| DbError::internal(format!("Failed to serialize rows: {}", e)))
    }
}
