//! Ad-hoc read-only SQL for the query console

use crate::executor::{SqlExecutor, run_timed};
use quad_core::{Error, QueryOutcome, Result};
use quad_telemetry::SqlSpanAttributes;
use std::sync::Arc;

/// Statement prefixes accepted by [`QueryExecutor::execute`]
pub const ALLOWED_PREFIXES: [&str; 5] = ["select", "with", "show", "describe", "explain"];

pub const FORBIDDEN_MESSAGE: &str =
    "Only SELECT, WITH, SHOW, DESCRIBE, and EXPLAIN statements are allowed for security reasons";

/// Prefix check on the trimmed, lower-cased text.
///
/// This is not a parser: a data-modifying CTE (`WITH ... INSERT`) passes.
pub fn is_allowed(sql: &str) -> bool {
    let normalized = sql.trim().to_lowercase();
    ALLOWED_PREFIXES
        .iter()
        .any(|prefix| normalized.starts_with(prefix))
}

#[derive(Clone)]
pub struct QueryExecutor {
    executor: Arc<dyn SqlExecutor>,
}

impl QueryExecutor {
    pub fn new(executor: Arc<dyn SqlExecutor>) -> Self {
        Self { executor }
    }

    /// Run caller-supplied SQL after the allow-list check.
    ///
    /// Database failures come back as an unsuccessful outcome with timing;
    /// only blank or forbidden text is an error.
    pub async fn execute(&self, sql: &str) -> Result<QueryOutcome> {
        if sql.trim().is_empty() {
            return Err(Error::validation("Query is required"));
        }
        if !is_allowed(sql) {
            tracing::warn!("Rejected non read-only statement");
            return Err(Error::ForbiddenStatement(FORBIDDEN_MESSAGE.to_string()));
        }

        let execution_id = uuid::Uuid::new_v4();
        tracing::debug!(execution_id = %execution_id, "Executing ad-hoc query");

        let outcome = run_timed(
            self.executor.as_ref(),
            SqlSpanAttributes::new("query", None),
            sql,
            vec![],
        )
        .await;

        tracing::debug!(
            execution_id = %execution_id,
            success = outcome.success,
            elapsed_ms = outcome.execution_time,
            "Ad-hoc query finished"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{MockSqlExecutor, RowSet};
    use crate::reflect::tests::record;
    use serde_json::json;

    #[test]
    fn test_allow_list() {
        assert!(is_allowed("SELECT 1"));
        assert!(is_allowed("  select * from users"));
        assert!(is_allowed("WITH t AS (SELECT 1) SELECT * FROM t"));
        assert!(is_allowed("show search_path"));
        assert!(is_allowed("Explain analyze select 1"));
        assert!(is_allowed("DESCRIBE users"));

        assert!(!is_allowed("DROP TABLE users"));
        assert!(!is_allowed("delete from users"));
        assert!(!is_allowed("insert into users values (1)"));
        assert!(!is_allowed("-- comment\nSELECT 1"));
    }

    #[test]
    fn test_data_modifying_cte_passes_prefix_check() {
        assert!(is_allowed(
            "WITH gone AS (DELETE FROM users RETURNING *) SELECT * FROM gone"
        ));
    }

    #[tokio::test]
    async fn test_forbidden_statement_never_reaches_database() {
        let mut mock = MockSqlExecutor::new();
        mock.expect_run().times(0);

        let executor = QueryExecutor::new(Arc::new(mock));
        let err = executor.execute("DROP TABLE users").await.unwrap_err();

        assert!(matches!(err, Error::ForbiddenStatement(_)));
        assert_eq!(err.to_string(), FORBIDDEN_MESSAGE);
    }

    #[tokio::test]
    async fn test_blank_query_is_invalid() {
        let mut mock = MockSqlExecutor::new();
        mock.expect_run().times(0);

        let executor = QueryExecutor::new(Arc::new(mock));
        let err = executor.execute("   ").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_select_returns_rows_and_columns() {
        let mut mock = MockSqlExecutor::new();
        mock.expect_run()
            .withf(|sql, params| sql == "SELECT 1 AS one, 'a' AS two" && params.is_empty())
            .times(1)
            .returning(|_, _| {
                Ok(RowSet::new(
                    vec!["one".to_string(), "two".to_string()],
                    vec![record(json!({"one": 1, "two": "a"}))],
                ))
            });

        let executor = QueryExecutor::new(Arc::new(mock));
        let outcome = executor
            .execute("SELECT 1 AS one, 'a' AS two")
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.row_count, Some(1));
        assert_eq!(
            outcome.columns,
            Some(vec!["one".to_string(), "two".to_string()])
        );
        assert_eq!(outcome.data.unwrap()[0]["two"], json!("a"));
    }

    #[tokio::test]
    async fn test_database_error_is_reported_with_timing() {
        let mut mock = MockSqlExecutor::new();
        mock.expect_run()
            .times(1)
            .returning(|_, _| Err(Error::database("column \"nope\" does not exist")));

        let executor = QueryExecutor::new(Arc::new(mock));
        let outcome = executor.execute("SELECT nope FROM users").await.unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("column \"nope\" does not exist"));
        let wire = serde_json::to_value(&outcome).unwrap();
        assert!(wire.get("executionTime").is_some());
    }
}
