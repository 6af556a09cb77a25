//! Schema introspection.
//!
//! Reads table and column metadata from `information_schema`. Catalog
//! identifiers are `sql_identifier` domains, so every selected column is cast
//! to `text` before decoding.

use crate::error::DbResult;
use serde::Serialize;
use sqlx::{PgPool, Row};
use tracing::debug;

/// One column of a table, as served by `resources/read`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub column_name: String,
    pub data_type: String,
}

mod queries {
    pub const LIST_TABLES: &str = r#"
        SELECT table_name::text AS table_name
        FROM information_schema.tables
        WHERE table_schema = $1
        ORDER BY table_name
        "#;

    pub const TABLE_COLUMNS: &str = r#"
        SELECT
            column_name::text AS column_name,
            data_type::text AS data_type
        FROM information_schema.columns
        WHERE table_name = $1
        AND table_schema = $2
        ORDER BY ordinal_position
        "#;
}

/// Schema inspector for database introspection.
pub struct SchemaInspector;

impl SchemaInspector {
    /// Names of all tables and views in `schema`.
    pub async fn list_tables(pool: &PgPool, schema: &str) -> DbResult<Vec<String>> {
        let rows = sqlx::query(queries::LIST_TABLES)
            .bind(schema)
            .fetch_all(pool)
            .await?;

        let tables: Vec<String> = rows
            .iter()
            .map(|row| row.get::<String, _>("table_name"))
            .filter(|name| !name.is_empty())
            .collect();

        debug!(count = tables.len(), schema = schema, "Listed PostgreSQL tables");
        Ok(tables)
    }

    /// Columns of `table` in `schema`, in declaration order.
    ///
    /// An unknown table yields an empty list.
    pub async fn table_columns(
        pool: &PgPool,
        table: &str,
        schema: &str,
    ) -> DbResult<Vec<ColumnInfo>> {
        let rows = sqlx::query(queries::TABLE_COLUMNS)
            .bind(table)
            .bind(schema)
            .fetch_all(pool)
            .await?;

        let columns: Vec<ColumnInfo> = rows
            .iter()
            .map(|row| ColumnInfo {
                column_name: row.get("column_name"),
                data_type: row.get("data_type"),
            })
            .collect();

        debug!(
            table = table,
            schema = schema,
            count = columns.len(),
            "Described PostgreSQL table"
        );
        Ok(columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_info_serializes_with_snake_case_keys() {
        let column = ColumnInfo {
            column_name: "id".to_string(),
            data_type: "integer".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&column).unwrap(),
            serde_json::json!({"column_name": "id", "data_type": "integer"})
        );
    }

    #[test]
    fn test_queries_are_parameterized() {
        assert!(queries::LIST_TABLES.contains("$1"));
        assert!(queries::TABLE_COLUMNS.contains("$1"));
        assert!(queries::TABLE_COLUMNS.contains("$2"));
    }
}
