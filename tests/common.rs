//! Common test utilities and helpers

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use quad_core::{ConnectionTarget, CredentialCipher, Record, Result};
use quad_db::{ConnectionTest, ExecutorProvider, RowSet, SqlExecutor, SqlValue};
use quad_server::{AppState, create_router};
use quad_store::{AdminStore, InMemoryStore};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

pub const TEST_KEY: &str = "integration-test-key";

/// A statement as the executor received it
pub type Call = (String, Vec<SqlValue>);

/// Scripted target database.
///
/// Catalog lookups answer for a single `public.people` table
/// `(id int4 primary key, name text, age int4)`; every other statement
/// returns `data_rows`, or fails with `fail_with` when set.
#[derive(Default)]
pub struct FakeDatabase {
    pub calls: Mutex<Vec<Call>>,
    pub data_rows: Mutex<Vec<Record>>,
    pub fail_with: Mutex<Option<String>>,
}

impl FakeDatabase {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn returning(self: &Arc<Self>, rows: Vec<Value>) -> Arc<Self> {
        *self.data_rows.lock().unwrap() = rows.into_iter().map(record).collect();
        self.clone()
    }

    pub fn failing(self: &Arc<Self>, message: &str) -> Arc<Self> {
        *self.fail_with.lock().unwrap() = Some(message.to_string());
        self.clone()
    }

    /// Statements other than catalog lookups
    pub fn data_calls(&self) -> Vec<Call> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(sql, _)| !sql.contains("information_schema"))
            .cloned()
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

pub fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {}", other),
    }
}

fn column(name: &str, udt: &str, pk: bool) -> Record {
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

fn names(rows: &[Record]) -> Vec<String> {
    rows.first()
        .map(|r| r.keys().cloned().collect())
        .unwrap_or_default()
}

#[async_trait]
impl SqlExecutor for FakeDatabase {
    async fn run(&self, sql: &str, params: Vec<SqlValue>) -> Result<RowSet> {
        self.calls
            .lock()
            .unwrap()
            .push((sql.to_string(), params.clone()));

        if sql.contains("information_schema.tables") {
            let wanted = params.is_empty() || params.contains(&SqlValue::Text("people".into()));
            let rows = if wanted {
                vec![record(json!({
                    "table_name": "people",
                    "table_schema": "public",
                    "table_type": "BASE TABLE",
                }))]
            } else {
                vec![]
            };
            return Ok(RowSet::new(vec![], rows));
        }
        if sql.contains("information_schema.columns") {
            let rows = vec![
                column("id", "int4", true),
                column("name", "text", false),
                column("age", "int4", false),
            ];
            return Ok(RowSet::new(vec![], rows));
        }
        if sql.contains("COUNT(*)") {
            return Ok(RowSet::new(
                vec!["count".to_string()],
                vec![record(json!({ "count": 2 }))],
            ));
        }

        if let Some(message) = self.fail_with.lock().unwrap().clone() {
            return Err(quad_core::Error::database(message));
        }
        let rows = self.data_rows.lock().unwrap().clone();
        Ok(RowSet::new(names(&rows), rows))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Hands every target the same fake database and remembers who asked
pub struct FakePools {
    pub database: Arc<FakeDatabase>,
    pub targets: Mutex<Vec<ConnectionTarget>>,
}

impl FakePools {
    pub fn new(database: Arc<FakeDatabase>) -> Arc<Self> {
        Arc::new(Self {
            database,
            targets: Mutex::new(vec![]),
        })
    }
}

#[async_trait]
impl ExecutorProvider for FakePools {
    fn executor(&self, target: &ConnectionTarget) -> Arc<dyn SqlExecutor> {
        self.targets.lock().unwrap().push(target.clone());
        self.database.clone()
    }

    async fn test(&self, target: &ConnectionTarget) -> ConnectionTest {
        if target.host == "reachable.example" {
            ConnectionTest::ok()
        } else {
            ConnectionTest::failed(format!("could not connect to {}", target.host))
        }
    }

    async fn close_all(&self) {}
}

pub fn store() -> Arc<InMemoryStore> {
    Arc::new(InMemoryStore::new(Arc::new(
        CredentialCipher::new(TEST_KEY).unwrap(),
    )))
}

pub fn app(pools: Arc<dyn ExecutorProvider>) -> Router {
    let store: Arc<dyn AdminStore> = store();
    create_router(AppState { store, pools })
}

pub fn connection_body(name: &str, host: &str, port: u16) -> Value {
    json!({
        "name": name,
        "host": host,
        "port": port,
        "database_name": "app",
        "username": "postgres",
        "password": "s3cret",
    })
}

/// Send one request through the router and decode the JSON answer
pub async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}

/// Create a connection profile and return its id
pub async fn create_connection(app: &Router, host: &str, port: u16) -> i64 {
    let (status, body) = send(
        app,
        "POST",
        "/api/connections",
        Some(connection_body("local", host, port)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["id"].as_i64().unwrap()
}
