//! Read-only query guard.
//!
//! Every caller-supplied statement runs on its own pooled connection inside a
//! `READ ONLY` transaction that is always rolled back, never committed. The
//! connection goes back to the pool only after the rollback attempt has
//! resolved, whatever the statement's outcome.
//!
//! Rejecting writes is left to PostgreSQL: a write inside a read-only
//! transaction fails with SQLSTATE 25006 and that error reaches the caller.

use crate::db::types::RowToJson;
use crate::error::DbResult;
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Pool, Postgres, Transaction};
use std::future::Future;
use tracing::{debug, warn};

pub const BEGIN_READ_ONLY: &str = "BEGIN TRANSACTION READ ONLY";

/// One result row keyed by column name.
pub type JsonRow = serde_json::Map<String, JsonValue>;

/// Source of read-only sessions for [`QueryGuard`].
pub trait SessionPool: Send + Sync {
    type Session: ReadOnlySession;

    /// Check a connection out of the pool and open a read-only transaction on it.
    ///
    /// If the transaction cannot be opened the connection is returned to the pool.
    fn begin_read_only(&self) -> impl Future<Output = DbResult<Self::Session>> + Send;
}

/// A read-only transaction holding one pooled connection.
///
/// Dropping a session that was never closed must still roll it back before
/// its connection is reused.
pub trait ReadOnlySession: Send {
    /// Run one caller-supplied statement and collect its rows.
    fn fetch_rows(&mut self, sql: &str) -> impl Future<Output = DbResult<Vec<JsonRow>>> + Send;

    /// Roll the transaction back and hand the connection back to its pool.
    fn close(self) -> impl Future<Output = DbResult<()>> + Send;
}

impl SessionPool for PgPool {
    type Session = Transaction<'static, Postgres>;

    async fn begin_read_only(&self) -> DbResult<Self::Session> {
        Ok(Pool::begin_with(self, BEGIN_READ_ONLY).await?)
    }
}

impl ReadOnlySession for Transaction<'static, Postgres> {
    // The extended query protocol accepts a single statement only, so
    // `SELECT 1; COMMIT; ...` is rejected instead of escaping the transaction.
    async fn fetch_rows(&mut self, sql: &str) -> DbResult<Vec<JsonRow>> {
        let rows = sqlx::query(sql)
            .persistent(false)
            .fetch_all(&mut **self)
            .await?;
        Ok(rows.iter().map(RowToJson::to_json_map).collect())
    }

    async fn close(self) -> DbResult<()> {
        self.rollback().await?;
        Ok(())
    }
}

/// Executes statements inside a read-only transaction.
pub struct QueryGuard;

impl QueryGuard {
    /// Run `sql` verbatim in a read-only transaction and return its rows.
    ///
    /// The statement's own error is returned unchanged; a failed rollback is
    /// only logged. If this future is dropped mid-statement, the session's
    /// drop queues the rollback instead.
    pub async fn execute<P: SessionPool>(pool: &P, sql: &str) -> DbResult<Vec<JsonRow>> {
        let mut session = pool.begin_read_only().await?;

        let outcome = session.fetch_rows(sql).await;

        if let Err(e) = session.close().await {
            warn!(error = %e, "Could not roll back read-only transaction");
        }

        debug!(succeeded = outcome.is_ok(), "Read-only session closed");
        outcome
    }
}

/// Scriptable in-memory pool that records every statement it sees.
#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use crate::error::DbError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    pub const ROLLBACK: &str = "ROLLBACK";

    #[derive(Debug, Default)]
    pub struct Journal {
        statements: Mutex<Vec<String>>,
        checkouts: AtomicUsize,
        releases: AtomicUsize,
    }

    impl Journal {
        fn record(&self, statement: &str) {
            self.statements
                .lock()
                .expect("journal lock")
                .push(statement.to_string());
        }

        pub fn statements(&self) -> Vec<String> {
            self.statements.lock().expect("journal lock").clone()
        }

        pub fn checkouts(&self) -> usize {
            self.checkouts.load(Ordering::SeqCst)
        }

        pub fn releases(&self) -> usize {
            self.releases.load(Ordering::SeqCst)
        }
    }

    #[derive(Debug, Clone, Default)]
    pub struct MockPool {
        pub journal: Arc<Journal>,
        pub rows: Vec<JsonRow>,
        pub fail_checkout: bool,
        pub fail_begin: bool,
        pub fail_query: bool,
        pub stall_query: bool,
        pub fail_rollback: bool,
    }

    impl MockPool {
        pub fn with_rows(rows: Vec<JsonRow>) -> Self {
            Self {
                rows,
                ..Self::default()
            }
        }
    }

    /// Mirrors `sqlx::Transaction`: an unclosed session rolls back on drop.
    pub struct MockSession {
        pool: MockPool,
        open: bool,
    }

    impl MockSession {
        fn finish(&mut self) {
            self.open = false;
            self.pool.journal.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Drop for MockSession {
        fn drop(&mut self) {
            if self.open {
                self.pool.journal.record(ROLLBACK);
                self.finish();
            }
        }
    }

    impl SessionPool for MockPool {
        type Session = MockSession;

        async fn begin_read_only(&self) -> DbResult<MockSession> {
            if self.fail_checkout {
                return Err(DbError::timeout("connection pool acquire", 30));
            }
            self.journal.checkouts.fetch_add(1, Ordering::SeqCst);
            self.journal.record(BEGIN_READ_ONLY);
            if self.fail_begin {
                self.journal.releases.fetch_add(1, Ordering::SeqCst);
                return Err(DbError::connection("connection reset by peer", "Reconnect"));
            }
            Ok(MockSession {
                pool: self.clone(),
                open: true,
            })
        }
    }

    impl ReadOnlySession for MockSession {
        async fn fetch_rows(&mut self, sql: &str) -> DbResult<Vec<JsonRow>> {
            self.pool.journal.record(sql);
            if self.pool.stall_query {
                std::future::pending::<()>().await;
            }
            if self.pool.fail_query {
                return Err(DbError::database(
                    "cannot execute INSERT in a read-only transaction",
                    Some("25006".to_string()),
                    "Only read-only statements are allowed",
                ));
            }
            Ok(self.pool.rows.clone())
        }

        async fn close(mut self) -> DbResult<()> {
            self.pool.journal.record(ROLLBACK);
            self.finish();
            if self.pool.fail_rollback {
                Err(DbError::connection("connection reset by peer", "Reconnect"))
            } else {
                Ok(())
            }
        }
    }

    pub fn row(pairs: &[(&str, JsonValue)]) -> JsonRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }
}
