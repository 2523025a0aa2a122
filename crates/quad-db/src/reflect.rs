//! Runtime discovery of tables, columns and keys via `information_schema`

use crate::executor::{SqlExecutor, SqlValue};
use crate::ident::TableRef;
use quad_core::{ColumnDescriptor, Error, Record, Result, TableDescriptor};
use serde_json::Value;
use std::sync::Arc;

pub(crate) const TABLES_QUERY: &str = r#"
    SELECT
        table_name::text AS table_name,
        table_schema::text AS table_schema,
        table_type::text AS table_type
    FROM information_schema.tables
    WHERE table_schema NOT IN ('information_schema', 'pg_catalog', 'pg_toast')
    ORDER BY table_schema, table_name
"#;

pub(crate) const TABLE_QUERY: &str = r#"
    SELECT
        table_name::text AS table_name,
        table_schema::text AS table_schema,
        table_type::text AS table_type
    FROM information_schema.tables
    WHERE table_schema = $1 AND table_name = $2
"#;

/// Columns in ordinal order, annotated with primary and foreign key usage.
/// `$1` is the table name, `$2` its schema.
pub(crate) const COLUMNS_QUERY: &str = r#"
    SELECT
        c.column_name::text AS column_name,
        c.data_type::text AS data_type,
        c.udt_schema::text AS udt_schema,
        c.udt_name::text AS udt_name,
        c.is_nullable::text AS is_nullable,
        c.column_default::text AS column_default,
        c.character_maximum_length::bigint AS character_maximum_length,
        c.numeric_precision::bigint AS numeric_precision,
        c.numeric_scale::bigint AS numeric_scale,
        (pk.column_name IS NOT NULL) AS is_primary_key,
        (fk.column_name IS NOT NULL) AS is_foreign_key,
        fk.foreign_table_name::text AS foreign_table,
        fk.foreign_column_name::text AS foreign_column
    FROM information_schema.columns c
    LEFT JOIN (
        SELECT DISTINCT ku.column_name
        FROM information_schema.table_constraints tc
        INNER JOIN information_schema.key_column_usage ku
            ON tc.constraint_name = ku.constraint_name
            AND tc.constraint_schema = ku.constraint_schema
        WHERE tc.constraint_type = 'PRIMARY KEY'
            AND tc.table_name = $1
            AND tc.table_schema = $2
    ) pk ON c.column_name = pk.column_name
    LEFT JOIN (
        SELECT DISTINCT ON (ku.column_name)
            ku.column_name,
            ccu.table_name AS foreign_table_name,
            ccu.column_name AS foreign_column_name
        FROM information_schema.table_constraints tc
        INNER JOIN information_schema.key_column_usage ku
            ON tc.constraint_name = ku.constraint_name
            AND tc.constraint_schema = ku.constraint_schema
        INNER JOIN information_schema.constraint_column_usage ccu
            ON ccu.constraint_name = tc.constraint_name
            AND ccu.constraint_schema = tc.constraint_schema
        WHERE tc.constraint_type = 'FOREIGN KEY'
            AND tc.table_name = $1
            AND tc.table_schema = $2
        ORDER BY ku.column_name, ccu.table_name, ccu.column_name
    ) fk ON c.column_name = fk.column_name
    WHERE c.table_name = $1 AND c.table_schema = $2
    ORDER BY c.ordinal_position
"#;

/// Describes the structure of a target database. Nothing is cached: every
/// call reflects the catalog as it is now.
#[derive(Clone)]
pub struct SchemaReflector {
    executor: Arc<dyn SqlExecutor>,
}

impl SchemaReflector {
    pub fn new(executor: Arc<dyn SqlExecutor>) -> Self {
        Self { executor }
    }

    /// Every user table with its columns and a point-in-time row count.
    ///
    /// Any catalog failure aborts the whole describe; no partial schema is
    /// returned.
    pub async fn describe_schema(&self) -> Result<Vec<TableDescriptor>> {
        let tables = self.executor.run(TABLES_QUERY, vec![]).await?;

        let mut descriptors = Vec::with_capacity(tables.rows.len());
        for row in &tables.rows {
            let mut descriptor = self.table_from_row(row).await?;
            descriptor.row_count = Some(self.count_rows(&descriptor).await?);
            descriptors.push(descriptor);
        }

        tracing::debug!(tables = descriptors.len(), "Described schema");
        Ok(descriptors)
    }

    /// Columns of a single table, or `None` when it does not exist.
    /// The row count is not taken.
    pub async fn describe_table(&self, table: &TableRef) -> Result<Option<TableDescriptor>> {
        let found = self
            .executor
            .run(
                TABLE_QUERY,
                vec![
                    SqlValue::Text(table.schema.clone()),
                    SqlValue::Text(table.name.clone()),
                ],
            )
            .await?;

        match found.rows.first() {
            Some(row) => Ok(Some(self.table_from_row(row).await?)),
            None => Ok(None),
        }
    }

    async fn table_from_row(&self, row: &Record) -> Result<TableDescriptor> {
        let table_name = text(row, "table_name")?;
        let table_schema = text(row, "table_schema")?;
        let table_type = text(row, "table_type")?;

        let columns = self
            .executor
            .run(
                COLUMNS_QUERY,
                vec![
                    SqlValue::Text(table_name.clone()),
                    SqlValue::Text(table_schema.clone()),
                ],
            )
            .await?
            .rows
            .iter()
            .map(column_from_row)
            .collect::<Result<Vec<_>>>()?;

        Ok(TableDescriptor {
            table_name,
            table_schema,
            table_type,
            columns,
            row_count: None,
        })
    }

    async fn count_rows(&self, table: &TableDescriptor) -> Result<i64> {
        let table_ref = TableRef::new(&table.table_schema, &table.table_name);
        let sql = format!("SELECT COUNT(*) AS count FROM {}", table_ref.qualified());
        let counted = self.executor.run(&sql, vec![]).await?;

        counted
            .rows
            .first()
            .and_then(|row| row.get("count"))
            .and_then(Value::as_i64)
            .ok_or_else(|| Error::database(format!("Row count missing for {}", table_ref)))
    }
}

fn column_from_row(row: &Record) -> Result<ColumnDescriptor> {
    Ok(ColumnDescriptor {
        column_name: text(row, "column_name")?,
        data_type: text(row, "data_type")?,
        udt_schema: text(row, "udt_schema")?,
        udt_name: text(row, "udt_name")?,
        is_nullable: text(row, "is_nullable")?,
        column_default: opt_text(row, "column_default"),
        character_maximum_length: opt_i64(row, "character_maximum_length"),
        numeric_precision: opt_i64(row, "numeric_precision"),
        numeric_scale: opt_i64(row, "numeric_scale"),
        is_primary_key: flag(row, "is_primary_key"),
        is_foreign_key: flag(row, "is_foreign_key"),
        foreign_table: opt_text(row, "foreign_table"),
        foreign_column: opt_text(row, "foreign_column"),
    })
}

fn text(row: &Record, key: &str) -> Result<String> {
    opt_text(row, key)
        .ok_or_else(|| Error::database(format!("Unexpected catalog row: missing {}", key)))
}

fn opt_text(row: &Record, key: &str) -> Option<String> {
    row.get(key).and_then(Value::as_str).map(str::to_string)
}

fn opt_i64(row: &Record, key: &str) -> Option<i64> {
    row.get(key).and_then(Value::as_i64)
}

fn flag(row: &Record, key: &str) -> bool {
    row.get(key).and_then(Value::as_bool).unwrap_or(false)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::executor::{MockSqlExecutor, RowSet};
    use serde_json::json;

    pub(crate) fn record(value: serde_json::Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    pub(crate) fn column_row(name: &str, udt: &str, pk: bool) -> Record {
        record(json!({
            "column_name": name,
            "data_type": udt,
            "udt_schema": "pg_catalog",
            "udt_name": udt,
            "is_nullable": if pk { "NO" } else { "YES" },
            "column_default": null,
            "character_maximum_length": null,
            "numeric_precision": null,
            "numeric_scale": null,
            "is_primary_key": pk,
            "is_foreign_key": false,
            "foreign_table": null,
            "foreign_column": null,
        }))
    }

    pub(crate) fn people_table_row() -> Record {
        record(json!({
            "table_name": "people",
            "table_schema": "public",
            "table_type": "BASE TABLE",
        }))
    }

    /// `(id serial primary key, name text, age int)`
    pub(crate) fn people_columns() -> Vec<Record> {
        vec![
            column_row("id", "int4", true),
            column_row("name", "text", false),
            column_row("age", "int4", false),
        ]
    }

    #[tokio::test]
    async fn test_describe_schema_preserves_column_order() {
        let mut mock = MockSqlExecutor::new();
        mock.expect_run()
            .withf(|sql, _| sql == TABLES_QUERY)
            .times(1)
            .returning(|_, _| Ok(RowSet::new(vec![], vec![people_table_row()])));
        mock.expect_run()
            .withf(|sql, params| {
                sql == COLUMNS_QUERY
                    && params
                        == &vec![
                            SqlValue::Text("people".to_string()),
                            SqlValue::Text("public".to_string()),
                        ]
            })
            .times(1)
            .returning(|_, _| Ok(RowSet::new(vec![], people_columns())));
        mock.expect_run()
            .withf(|sql, _| sql == "SELECT COUNT(*) AS count FROM \"public\".\"people\"")
            .times(1)
            .returning(|_, _| Ok(RowSet::new(vec![], vec![record(json!({"count": 3}))])));

        let reflector = SchemaReflector::new(Arc::new(mock));
        let tables = reflector.describe_schema().await.unwrap();

        assert_eq!(tables.len(), 1);
        let people = &tables[0];
        assert_eq!(people.row_count, Some(3));
        let names: Vec<&str> = people.columns.iter().map(|c| c.column_name.as_str()).collect();
        assert_eq!(names, vec!["id", "name", "age"]);
        assert!(people.columns[0].is_primary_key);
        assert!(!people.columns[1].is_primary_key);
        assert!(people.columns[2].nullable());
    }

    #[tokio::test]
    async fn test_describe_schema_aborts_on_failure() {
        let mut mock = MockSqlExecutor::new();
        mock.expect_run()
            .withf(|sql, _| sql == TABLES_QUERY)
            .returning(|_, _| Ok(RowSet::new(vec![], vec![people_table_row()])));
        mock.expect_run()
            .withf(|sql, _| sql == COLUMNS_QUERY)
            .returning(|_, _| Ok(RowSet::new(vec![], people_columns())));
        mock.expect_run()
            .withf(|sql, _| sql.starts_with("SELECT COUNT(*)"))
            .returning(|_, _| Err(Error::database("permission denied for table people")));

        let reflector = SchemaReflector::new(Arc::new(mock));
        let err = reflector.describe_schema().await.unwrap_err();
        assert_eq!(err.to_string(), "permission denied for table people");
    }

    #[tokio::test]
    async fn test_describe_missing_table() {
        let mut mock = MockSqlExecutor::new();
        mock.expect_run()
            .withf(|sql, _| sql == TABLE_QUERY)
            .times(1)
            .returning(|_, _| Ok(RowSet::default()));

        let reflector = SchemaReflector::new(Arc::new(mock));
        let found = reflector
            .describe_table(&TableRef::new("public", "ghosts"))
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_foreign_key_annotation() {
        let mut row = column_row("customer_id", "int4", false);
        row.insert("is_foreign_key".to_string(), json!(true));
        row.insert("foreign_table".to_string(), json!("customers"));
        row.insert("foreign_column".to_string(), json!("id"));

        let column = column_from_row(&row).unwrap();
        assert!(column.is_foreign_key);
        assert_eq!(column.foreign_table.as_deref(), Some("customers"));
        assert_eq!(column.foreign_column.as_deref(), Some("id"));
    }
}
