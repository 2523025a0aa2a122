//! Span creation helpers for statements sent to target databases

use crate::attributes::*;
use tracing::Span;
use tracing::field::Empty;

/// Attributes for tracing one SQL statement
#[derive(Debug, Clone)]
pub struct SqlSpanAttributes {
    /// `select`, `insert`, `update`, `delete` or `query` for console input
    pub operation: String,
    /// Qualified `schema.table`, when the statement addresses one table
    pub table: Option<String>,
}

impl SqlSpanAttributes {
    pub fn new(operation: impl Into<String>, table: Option<&str>) -> Self {
        Self {
            operation: operation.into(),
            table: table.map(str::to_string),
        }
    }
}

/// Create an info span for a statement.
///
/// Row count and timing are declared empty and filled in by
/// [`record_sql_outcome`] once the statement completes.
pub fn sql_span(attrs: &SqlSpanAttributes) -> Span {
    let span = tracing::info_span!(
        "execute_sql",
        { DB_SYSTEM } = SYSTEM_NAME,
        { DB_OPERATION } = %attrs.operation,
        { DB_TABLE } = Empty,
        { DB_ROWS } = Empty,
        { ELAPSED_MS } = Empty,
    );

    if let Some(table) = &attrs.table {
        span.record(DB_TABLE, table.as_str());
    }

    span
}

pub fn record_sql_outcome(span: &Span, rows: u64, elapsed_ms: u64) {
    span.record(DB_ROWS, rows);
    span.record(ELAPSED_MS, elapsed_ms);
}
