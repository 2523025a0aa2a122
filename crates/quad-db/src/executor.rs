//! The seam between the generic layers and a live database.
//!
//! Reflection, record access and ad-hoc queries all talk to a target through
//! [`SqlExecutor`], so they can be driven by a pooled PostgreSQL session in
//! production and by a mock in tests.

use crate::decode::row_to_record;
use async_trait::async_trait;
use quad_core::{Error, QueryOutcome, Record, Result};
use quad_telemetry::{SqlSpanAttributes, record_sql_outcome, sql_span};
use sqlx::postgres::{PgArguments, PgPool};
use sqlx::query::Query;
use sqlx::{Column, Executor, Postgres, Row};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

/// A positional parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Int(i64),
    /// Sent as text; statements cast it to the destination type
    Text(String),
}

/// Rows returned by one statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Record>,
}

impl RowSet {
    pub fn new(columns: Vec<String>, rows: Vec<Record>) -> Self {
        Self { columns, rows }
    }
}

/// Executes a single parameterized statement against one database
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Run one statement with positional `$n` parameters and collect its rows
    async fn run(&self, sql: &str, params: Vec<SqlValue>) -> Result<RowSet>;

    /// Trivial liveness check
    async fn ping(&self) -> Result<()>;
}

/// Map a driver error into the upstream database error class.
///
/// Pool exhaustion and connect timeouts keep the same class but carry a
/// distinguishing message.
pub fn db_error(err: sqlx::Error) -> Error {
    match err {
        sqlx::Error::PoolTimedOut => Error::database(
            "Connection timed out: no session became available before the acquire timeout",
        ),
        sqlx::Error::PoolClosed => Error::database("Connection pool is closed"),
        sqlx::Error::Database(db_err) => Error::database(db_err.message().to_string()),
        other => Error::database(other.to_string()),
    }
}

fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: SqlValue,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        SqlValue::Null => query.bind(Option::<String>::None),
        SqlValue::Int(v) => query.bind(v),
        SqlValue::Text(v) => query.bind(v),
    }
}

/// [`SqlExecutor`] backed by a shared connection pool
#[derive(Clone)]
pub struct PgExecutor {
    pool: Arc<PgPool>,
}

impl PgExecutor {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    async fn describe_columns(&self, sql: &str) -> Result<Vec<String>> {
        let described = self.pool.as_ref().describe(sql).await.map_err(db_error)?;
        Ok(described
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect())
    }
}

#[async_trait]
impl SqlExecutor for PgExecutor {
    async fn run(&self, sql: &str, params: Vec<SqlValue>) -> Result<RowSet> {
        let mut query = sqlx::query(sql);
        for value in params {
            query = bind_value(query, value);
        }

        let rows = query.fetch_all(self.pool.as_ref()).await.map_err(db_error)?;

        let columns = match rows.first() {
            Some(row) => row
                .columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect(),
            // Column names of an empty result come from the prepared statement
            None => match self.describe_columns(sql).await {
                Ok(columns) => columns,
                Err(e) => {
                    tracing::debug!(error = %e, "Could not describe empty result; columns unknown");
                    Vec::new()
                }
            },
        };

        Ok(RowSet {
            columns,
            rows: rows.iter().map(row_to_record).collect(),
        })
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(self.pool.as_ref())
            .await
            .map_err(db_error)?;
        Ok(())
    }
}

/// Run a statement under a span and a timer, folding failures into the
/// uniform outcome envelope.
pub async fn run_timed(
    executor: &dyn SqlExecutor,
    attrs: SqlSpanAttributes,
    sql: &str,
    params: Vec<SqlValue>,
) -> QueryOutcome {
    let span = sql_span(&attrs);
    let started = Instant::now();

    let result = executor.run(sql, params).instrument(span.clone()).await;
    let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    match result {
        Ok(row_set) => {
            let row_count = row_set.rows.len() as u64;
            record_sql_outcome(&span, row_count, elapsed);
            QueryOutcome::success(row_set.rows, row_set.columns, row_count, elapsed)
        }
        Err(e) => {
            tracing::error!(
                parent: &span,
                error = %e,
                elapsed_ms = elapsed,
                "Statement failed"
            );
            QueryOutcome::failure(e.to_string(), elapsed)
        }
    }
}
