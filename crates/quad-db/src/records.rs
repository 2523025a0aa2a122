//! Generic create/read/update/delete over any reflected table.
//!
//! Table and column names arrive unchecked from the client. Every name is
//! matched against the reflected schema before it is quoted into SQL, and
//! every value travels as a positional parameter cast to its column type.

use crate::executor::{SqlExecutor, SqlValue, run_timed};
use crate::ident::{TableRef, quote_ident};
use crate::reflect::SchemaReflector;
use quad_core::{ColumnDescriptor, Error, QueryOutcome, Record, Result, TableDescriptor};
use quad_telemetry::SqlSpanAttributes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

pub const DEFAULT_LIMIT: i64 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    #[serde(rename = "ASC", alias = "asc")]
    Asc,
    #[serde(rename = "DESC", alias = "desc")]
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Options for a paged, filtered read
#[derive(Debug, Clone, PartialEq)]
pub struct ReadOptions {
    /// Equality conditions, AND-ed; a null value matches `IS NULL`
    pub filter: Record,
    pub limit: i64,
    pub offset: i64,
    pub order_by: Option<String>,
    pub direction: SortDirection,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            filter: Record::new(),
            limit: DEFAULT_LIMIT,
            offset: 0,
            order_by: None,
            direction: SortDirection::Asc,
        }
    }
}

/// SQL text plus its positional parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Statement {
    /// Bind a value for `column`, returning the cast placeholder
    fn bind(&mut self, column: &ColumnDescriptor, value: &Value) -> String {
        self.params.push(to_param(column, value));
        format!(
            "${}::{}.{}",
            self.params.len(),
            quote_ident(&column.udt_schema),
            quote_ident(&column.udt_name)
        )
    }

    fn bind_int(&mut self, value: i64) -> String {
        self.params.push(SqlValue::Int(value));
        format!("${}", self.params.len())
    }

    fn conditions(&mut self, table: &TableDescriptor, filter: &Record) -> Result<String> {
        let mut parts = Vec::with_capacity(filter.len());
        for (name, value) in filter {
            let column = column_of(table, name)?;
            if value.is_null() {
                parts.push(format!("{} IS NULL", quote_ident(name)));
            } else {
                let placeholder = self.bind(column, value);
                parts.push(format!("{} = {}", quote_ident(name), placeholder));
            }
        }
        Ok(parts.join(" AND "))
    }
}

fn column_of<'a>(table: &'a TableDescriptor, name: &str) -> Result<&'a ColumnDescriptor> {
    table.column(name).ok_or_else(|| {
        Error::validation(format!(
            "Unknown column \"{}\" in table {}.{}",
            name, table.table_schema, table.table_name
        ))
    })
}

fn to_param(column: &ColumnDescriptor, value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Bool(b) => SqlValue::Text(b.to_string()),
        Value::Number(n) => SqlValue::Text(n.to_string()),
        Value::Array(items) if column.is_array() => SqlValue::Text(array_literal(items)),
        other => SqlValue::Text(other.to_string()),
    }
}

/// Render a JSON array as a PostgreSQL array literal
fn array_literal(items: &[Value]) -> String {
    let elements: Vec<String> = items
        .iter()
        .map(|item| match item {
            Value::Null => "NULL".to_string(),
            Value::Array(nested) => array_literal(nested),
            Value::String(s) => quote_element(s),
            Value::Object(_) => quote_element(&item.to_string()),
            other => other.to_string(),
        })
        .collect();
    format!("{{{}}}", elements.join(","))
}

fn quote_element(raw: &str) -> String {
    let mut quoted = String::with_capacity(raw.len() + 2);
    quoted.push('"');
    for c in raw.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

pub(crate) fn build_insert(
    table: &TableDescriptor,
    target: &TableRef,
    fields: &Record,
) -> Result<Statement> {
    let mut statement = Statement::default();
    let mut names = Vec::with_capacity(fields.len());
    let mut placeholders = Vec::with_capacity(fields.len());

    for (name, value) in fields {
        let column = column_of(table, name)?;
        names.push(quote_ident(name));
        placeholders.push(statement.bind(column, value));
    }

    statement.sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
        target.qualified(),
        names.join(", "),
        placeholders.join(", ")
    );
    Ok(statement)
}

pub(crate) fn build_select(
    table: &TableDescriptor,
    target: &TableRef,
    options: &ReadOptions,
) -> Result<Statement> {
    let mut statement = Statement::default();
    let mut sql = format!("SELECT * FROM {}", target.qualified());

    if !options.filter.is_empty() {
        let conditions = statement.conditions(table, &options.filter)?;
        sql.push_str(" WHERE ");
        sql.push_str(&conditions);
    }

    let direction = options.direction.as_sql();
    let ordering: Vec<String> = match &options.order_by {
        Some(name) => {
            column_of(table, name)?;
            vec![format!("{} {}", quote_ident(name), direction)]
        }
        // Stable paging without an explicit order
        None => table
            .primary_key()
            .iter()
            .map(|c| format!("{} {}", quote_ident(&c.column_name), direction))
            .collect(),
    };
    if !ordering.is_empty() {
        sql.push_str(" ORDER BY ");
        sql.push_str(&ordering.join(", "));
    }

    let limit = statement.bind_int(options.limit);
    let offset = statement.bind_int(options.offset);
    sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset));

    statement.sql = sql;
    Ok(statement)
}

pub(crate) fn build_update(
    table: &TableDescriptor,
    target: &TableRef,
    fields: &Record,
    filter: &Record,
) -> Result<Statement> {
    let mut statement = Statement::default();
    let mut assignments = Vec::with_capacity(fields.len());

    for (name, value) in fields {
        let column = column_of(table, name)?;
        let placeholder = statement.bind(column, value);
        assignments.push(format!("{} = {}", quote_ident(name), placeholder));
    }
    let conditions = statement.conditions(table, filter)?;

    statement.sql = format!(
        "UPDATE {} SET {} WHERE {} RETURNING *",
        target.qualified(),
        assignments.join(", "),
        conditions
    );
    Ok(statement)
}

pub(crate) fn build_delete(
    table: &TableDescriptor,
    target: &TableRef,
    filter: &Record,
) -> Result<Statement> {
    let mut statement = Statement::default();
    let conditions = statement.conditions(table, filter)?;
    statement.sql = format!(
        "DELETE FROM {} WHERE {} RETURNING *",
        target.qualified(),
        conditions
    );
    Ok(statement)
}

/// Record-level access to one target database
#[derive(Clone)]
pub struct RecordAccess {
    executor: Arc<dyn SqlExecutor>,
    reflector: SchemaReflector,
}

impl RecordAccess {
    pub fn new(executor: Arc<dyn SqlExecutor>) -> Self {
        Self {
            reflector: SchemaReflector::new(executor.clone()),
            executor,
        }
    }

    async fn reflect(&self, table: &str) -> Result<(TableRef, TableDescriptor)> {
        for target in TableRef::candidates(table)? {
            if let Some(descriptor) = self.reflector.describe_table(&target).await? {
                return Ok((target, descriptor));
            }
        }
        Err(Error::not_found(format!("Table not found: {}", table.trim())))
    }

    async fn execute(&self, operation: &str, target: &TableRef, statement: Statement) -> QueryOutcome {
        let table = target.to_string();
        let attrs = SqlSpanAttributes::new(operation, Some(table.as_str()));
        run_timed(
            self.executor.as_ref(),
            attrs,
            &statement.sql,
            statement.params,
        )
        .await
    }

    /// Insert one row with exactly the supplied fields
    pub async fn create(&self, table: &str, fields: &Record) -> Result<QueryOutcome> {
        if fields.is_empty() {
            return Err(Error::validation("No fields provided"));
        }

        let (target, descriptor) = self.reflect(table).await?;
        let statement = build_insert(&descriptor, &target, fields)?;

        tracing::warn!(table = %target, columns = fields.len(), "Inserting record");
        Ok(self.execute("insert", &target, statement).await)
    }

    pub async fn read(&self, table: &str, options: &ReadOptions) -> Result<QueryOutcome> {
        if options.limit < 0 || options.offset < 0 {
            return Err(Error::validation("limit and offset must not be negative"));
        }

        let (target, descriptor) = self.reflect(table).await?;
        let statement = build_select(&descriptor, &target, options)?;

        tracing::debug!(
            table = %target,
            limit = options.limit,
            offset = options.offset,
            "Reading records"
        );
        Ok(self.execute("select", &target, statement).await)
    }

    /// Update every row matching `filter`
    pub async fn update(&self, table: &str, fields: &Record, filter: &Record) -> Result<QueryOutcome> {
        if fields.is_empty() {
            return Err(Error::validation("No fields provided"));
        }
        if filter.is_empty() {
            return Err(Error::validation("A non-empty filter is required for update"));
        }

        let (target, descriptor) = self.reflect(table).await?;
        if !descriptor.has_primary_key() {
            return Err(Error::validation(format!(
                "Table {} has no primary key; updates are not allowed",
                target
            )));
        }
        let statement = build_update(&descriptor, &target, fields, filter)?;

        tracing::warn!(table = %target, columns = fields.len(), "Updating records");
        Ok(self.execute("update", &target, statement).await)
    }

    /// Delete every row matching `filter`
    pub async fn delete(&self, table: &str, filter: &Record) -> Result<QueryOutcome> {
        if filter.is_empty() {
            return Err(Error::validation("A non-empty filter is required for delete"));
        }

        let (target, descriptor) = self.reflect(table).await?;
        if !descriptor.has_primary_key() {
            return Err(Error::validation(format!(
                "Table {} has no primary key; deletes are not allowed",
                target
            )));
        }
        let statement = build_delete(&descriptor, &target, filter)?;

        tracing::warn!(table = %target, "Deleting records");
        Ok(self.execute("delete", &target, statement).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{MockSqlExecutor, RowSet};
    use crate::reflect::tests::{column_row, people_columns, people_table_row, record};
    use crate::reflect::{COLUMNS_QUERY, TABLE_QUERY};
    use serde_json::json;

    fn people() -> TableDescriptor {
        TableDescriptor {
            table_name: "people".to_string(),
            table_schema: "public".to_string(),
            table_type: "BASE TABLE".to_string(),
            columns: people_columns()
                .iter()
                .map(|row| serde_json::from_value(Value::Object(row.clone())).unwrap())
                .collect(),
            row_count: None,
        }
    }

    fn people_ref() -> TableRef {
        TableRef::new("public", "people")
    }

    /// A mock that answers reflection for `public.people` with `columns`
    fn reflecting(columns: Vec<Record>) -> MockSqlExecutor {
        let mut mock = MockSqlExecutor::new();
        mock.expect_run()
            .withf(|sql, _| sql == TABLE_QUERY)
            .times(1)
            .returning(|_, _| Ok(RowSet::new(vec![], vec![people_table_row()])));
        mock.expect_run()
            .withf(|sql, _| sql == COLUMNS_QUERY)
            .times(1)
            .returning(move |_, _| Ok(RowSet::new(vec![], columns.clone())));
        mock
    }

    #[test]
    fn test_insert_lists_supplied_fields_only() {
        let fields = record(json!({"name": "Ada", "age": 36}));
        let statement = build_insert(&people(), &people_ref(), &fields).unwrap();

        assert_eq!(
            statement.sql,
            "INSERT INTO \"public\".\"people\" (\"name\", \"age\") \
             VALUES ($1::\"pg_catalog\".\"text\", $2::\"pg_catalog\".\"int4\") RETURNING *"
        );
        assert_eq!(
            statement.params,
            vec![SqlValue::Text("Ada".to_string()), SqlValue::Text("36".to_string())]
        );
    }

    #[test]
    fn test_select_orders_by_primary_key_by_default() {
        let statement = build_select(&people(), &people_ref(), &ReadOptions::default()).unwrap();
        assert_eq!(
            statement.sql,
            "SELECT * FROM \"public\".\"people\" ORDER BY \"id\" ASC LIMIT $1 OFFSET $2"
        );
        assert_eq!(statement.params, vec![SqlValue::Int(100), SqlValue::Int(0)]);
    }

    #[test]
    fn test_select_with_filter_and_explicit_order() {
        let options = ReadOptions {
            filter: record(json!({"name": "Ada", "age": null})),
            limit: 10,
            offset: 20,
            order_by: Some("age".to_string()),
            direction: SortDirection::Desc,
        };
        let statement = build_select(&people(), &people_ref(), &options).unwrap();

        assert_eq!(
            statement.sql,
            "SELECT * FROM \"public\".\"people\" \
             WHERE \"name\" = $1::\"pg_catalog\".\"text\" AND \"age\" IS NULL \
             ORDER BY \"age\" DESC LIMIT $2 OFFSET $3"
        );
        assert_eq!(
            statement.params,
            vec![
                SqlValue::Text("Ada".to_string()),
                SqlValue::Int(10),
                SqlValue::Int(20)
            ]
        );
    }

    #[test]
    fn test_update_binds_set_before_where() {
        let fields = record(json!({"age": 37}));
        let filter = record(json!({"id": 1}));
        let statement = build_update(&people(), &people_ref(), &fields, &filter).unwrap();

        assert_eq!(
            statement.sql,
            "UPDATE \"public\".\"people\" SET \"age\" = $1::\"pg_catalog\".\"int4\" \
             WHERE \"id\" = $2::\"pg_catalog\".\"int4\" RETURNING *"
        );
        assert_eq!(
            statement.params,
            vec![SqlValue::Text("37".to_string()), SqlValue::Text("1".to_string())]
        );
    }

    #[test]
    fn test_unknown_column_is_rejected() {
        let fields = record(json!({"name": "Ada", "nickname": "A"}));
        let err = build_insert(&people(), &people_ref(), &fields).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(err.to_string().contains("nickname"));

        let options = ReadOptions {
            order_by: Some("id; DROP TABLE people".to_string()),
            ..ReadOptions::default()
        };
        assert!(matches!(
            build_select(&people(), &people_ref(), &options),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_array_values_become_array_literals() {
        let mut tags = serde_json::from_value::<ColumnDescriptor>(Value::Object(column_row(
            "tags", "_text", false,
        )))
        .unwrap();
        tags.data_type = "ARRAY".to_string();

        assert_eq!(
            to_param(&tags, &json!(["a", "b\"c", null])),
            SqlValue::Text("{\"a\",\"b\\\"c\",NULL}".to_string())
        );
        assert_eq!(
            to_param(&tags, &json!([[1, 2], [3, 4]])),
            SqlValue::Text("{{1,2},{3,4}}".to_string())
        );

        let table = people();
        assert_eq!(
            to_param(&table.columns[1], &json!({"k": 1})),
            SqlValue::Text("{\"k\":1}".to_string())
        );
    }

    #[tokio::test]
    async fn test_empty_filter_issues_no_sql() {
        let mut mock = MockSqlExecutor::new();
        mock.expect_run().times(0);
        let access = RecordAccess::new(Arc::new(mock));
        let fields = record(json!({"name": "Ada"}));

        let err = access.delete("people", &Record::new()).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        let err = access.update("people", &fields, &Record::new()).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        let err = access.create("people", &Record::new()).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_create_returns_inserted_row() {
        let mut mock = reflecting(people_columns());
        mock.expect_run()
            .withf(|sql, params| sql.starts_with("INSERT INTO") && params.len() == 2)
            .times(1)
            .returning(|_, _| {
                Ok(RowSet::new(
                    vec!["id".to_string(), "name".to_string(), "age".to_string()],
                    vec![record(json!({"id": 1, "name": "Ada", "age": 36}))],
                ))
            });

        let access = RecordAccess::new(Arc::new(mock));
        let outcome = access
            .create("people", &record(json!({"name": "Ada", "age": "36"})))
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.first_row().unwrap()["id"], json!(1));
        let columns = outcome.columns.unwrap();
        assert_eq!(columns, vec!["id", "name", "age"]);
    }

    #[tokio::test]
    async fn test_unknown_table_is_not_found() {
        let mut mock = MockSqlExecutor::new();
        mock.expect_run()
            .withf(|sql, _| sql == TABLE_QUERY)
            .times(1)
            .returning(|_, _| Ok(RowSet::default()));

        let access = RecordAccess::new(Arc::new(mock));
        let err = access
            .read("ghosts", &ReadOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_dotted_table_name_falls_back_to_public() {
        let mut mock = MockSqlExecutor::new();
        mock.expect_run()
            .withf(|sql, params| {
                sql == TABLE_QUERY
                    && params == &vec![SqlValue::Text("a".into()), SqlValue::Text("b".into())]
            })
            .times(1)
            .returning(|_, _| Ok(RowSet::default()));
        mock.expect_run()
            .withf(|sql, params| {
                sql == TABLE_QUERY
                    && params
                        == &vec![SqlValue::Text("public".into()), SqlValue::Text("a.b".into())]
            })
            .times(1)
            .returning(|_, _| {
                Ok(RowSet::new(
                    vec![],
                    vec![record(json!({
                        "table_name": "a.b",
                        "table_schema": "public",
                        "table_type": "BASE TABLE",
                    }))],
                ))
            });
        mock.expect_run()
            .withf(|sql, _| sql == COLUMNS_QUERY)
            .times(1)
            .returning(|_, _| {
                Ok(RowSet::new(
                    vec![],
                    vec![column_row("id", "int4", true), column_row("v", "text", false)],
                ))
            });
        mock.expect_run()
            .withf(|sql, _| sql.starts_with("SELECT * FROM \"public\".\"a.b\""))
            .times(1)
            .returning(|_, _| Ok(RowSet::new(vec!["id".into(), "v".into()], vec![])));

        let access = RecordAccess::new(Arc::new(mock));
        let outcome = access.read("a.b", &ReadOptions::default()).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.row_count, Some(0));
    }

    #[tokio::test]
    async fn test_table_without_primary_key_refuses_delete() {
        let columns = vec![column_row("name", "text", false), column_row("age", "int4", false)];
        let mock = reflecting(columns);

        let access = RecordAccess::new(Arc::new(mock));
        let err = access
            .delete("people", &record(json!({"name": "Ada"})))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_data_statement_failure_is_an_outcome() {
        let mut mock = reflecting(people_columns());
        mock.expect_run()
            .withf(|sql, _| sql.starts_with("DELETE FROM"))
            .times(1)
            .returning(|_, _| {
                Err(Error::database(
                    "update or delete on table \"people\" violates foreign key constraint",
                ))
            });

        let access = RecordAccess::new(Arc::new(mock));
        let outcome = access
            .delete("people", &record(json!({"id": 1})))
            .await
            .unwrap();
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("foreign key"));
    }

    #[test]
    fn test_sort_direction_wire_format() {
        let desc: SortDirection = serde_json::from_value(json!("desc")).unwrap();
        assert_eq!(desc, SortDirection::Desc);
        let asc: SortDirection = serde_json::from_value(json!("ASC")).unwrap();
        assert_eq!(asc, SortDirection::Asc);
        assert!(serde_json::from_value::<SortDirection>(json!("sideways")).is_err());
    }
}
