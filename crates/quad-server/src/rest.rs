use crate::error::{AppError, QueryError};
use crate::types::*;
use axum::{
    Router,
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use quad_core::{
    ConnectionSummary, DashboardStats, Error, QueryOutcome, SavedQuery, SavedTableView,
    TableDescriptor,
};
use quad_db::{
    ConnectionTest, DEFAULT_LIMIT, ExecutorProvider, QueryExecutor, ReadOptions, RecordAccess,
    SchemaReflector, SqlExecutor,
};
use quad_store::{
    AdminStore, ConnectionInput, ConnectionStore, SavedQueryInput, SavedQueryStore,
    TableViewInput, TableViewStore,
};
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn AdminStore>,
    pub pools: Arc<dyn ExecutorProvider>,
}

impl AppState {
    /// Executor for a stored, active connection
    async fn executor(&self, connection_id: Option<i64>) -> Result<Arc<dyn SqlExecutor>, Error> {
        let id = connection_id.ok_or_else(|| Error::validation("Connection ID is required"))?;
        let target = self.store.resolve(id).await?;
        Ok(self.pools.executor(&target))
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check endpoints
        .route("/health", get(health_check))
        .route("/readiness", get(readiness_check))
        // Connection profiles
        .route("/api/connections", get(list_connections).post(create_connection))
        .route("/api/connections/test", post(test_connection))
        .route(
            "/api/connections/:id",
            put(update_connection).delete(delete_connection),
        )
        // Target databases
        .route("/api/tables", get(list_tables))
        .route(
            "/api/tables/data",
            get(read_rows)
                .post(create_row)
                .put(update_rows)
                .delete(delete_rows),
        )
        .route("/api/query/execute", post(execute_query))
        // Saved items
        .route("/api/queries", get(list_queries).post(create_query))
        .route(
            "/api/saved-table-views",
            get(list_views)
                .post(create_view)
                .put(update_view)
                .delete(delete_view),
        )
        .route("/api/dashboard/stats", get(dashboard_stats))
        // Middleware layers (applied in reverse order)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint - returns OK if the service is running
async fn health_check() -> impl IntoResponse {
    tracing::debug!("Health check requested");
    (StatusCode::OK, "OK")
}

/// Readiness check endpoint - verifies the control-plane store answers
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    tracing::debug!("Readiness check requested");

    match state.store.ping().await {
        Ok(()) => (StatusCode::OK, "READY").into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Control-plane store not ready");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn list_connections(
    State(state): State<AppState>,
) -> Result<Json<Vec<ConnectionSummary>>, AppError> {
    Ok(Json(state.store.list().await?))
}

async fn create_connection(
    State(state): State<AppState>,
    Json(input): Json<ConnectionInput>,
) -> Result<(StatusCode, Json<ConnectionSummary>), AppError> {
    let created = state.store.create(&input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_connection(
    Path(id): Path<i64>,
    State(state): State<AppState>,
    Json(input): Json<ConnectionInput>,
) -> Result<Json<ConnectionSummary>, AppError> {
    Ok(Json(state.store.update(id, &input).await?))
}

async fn delete_connection(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.store.delete(id).await?;
    Ok(Json(SuccessResponse { success: true }))
}

/// Check unsaved connection details
async fn test_connection(
    State(state): State<AppState>,
    Json(request): Json<TestConnectionRequest>,
) -> (StatusCode, Json<ConnectionTest>) {
    match request.target() {
        Some(target) => (StatusCode::OK, Json(state.pools.test(&target).await)),
        None => (
            StatusCode::BAD_REQUEST,
            Json(ConnectionTest::failed("All connection fields are required")),
        ),
    }
}

async fn list_tables(
    State(state): State<AppState>,
    Query(query): Query<ConnectionQuery>,
) -> Result<Json<Vec<TableDescriptor>>, AppError> {
    let executor = state.executor(query.connection_id).await?;
    let tables = SchemaReflector::new(executor).describe_schema().await?;
    Ok(Json(tables))
}

fn require_table(table: Option<String>) -> Result<String, Error> {
    table
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| Error::validation("Connection ID and table name are required"))
}

/// A failed data statement becomes an upstream error
fn succeeded(outcome: QueryOutcome) -> Result<QueryOutcome, Error> {
    if outcome.success {
        Ok(outcome)
    } else {
        Err(Error::database(outcome.error.unwrap_or_default()))
    }
}

async fn read_rows(
    State(state): State<AppState>,
    Query(query): Query<TableDataQuery>,
) -> Result<Json<TableRowsResponse>, AppError> {
    let table = require_table(query.table)?;
    let executor = state.executor(query.connection_id).await?;

    let options = ReadOptions {
        limit: query.limit.unwrap_or(DEFAULT_LIMIT),
        offset: query.offset.unwrap_or(0),
        order_by: query.order_by.filter(|o| !o.is_empty()),
        direction: query.order_direction.unwrap_or_default(),
        ..ReadOptions::default()
    };
    let outcome = succeeded(RecordAccess::new(executor).read(&table, &options).await?)?;

    Ok(Json(TableRowsResponse {
        row_count: outcome.row_count.unwrap_or(0),
        columns: outcome.columns.unwrap_or_default(),
        rows: outcome.data.unwrap_or_default(),
    }))
}

async fn create_row(
    State(state): State<AppState>,
    Json(request): Json<TableDataRequest>,
) -> Result<Json<Value>, AppError> {
    let table = require_table(request.table)?;
    let data = request
        .data
        .ok_or_else(|| Error::validation("Connection ID, table name, and data are required"))?;
    let executor = state.executor(request.connection_id).await?;

    let outcome = succeeded(RecordAccess::new(executor).create(&table, &data).await?)?;
    let inserted = outcome.first_row().cloned().map(Value::Object);
    Ok(Json(inserted.unwrap_or(Value::Null)))
}

async fn update_rows(
    State(state): State<AppState>,
    Json(request): Json<TableDataRequest>,
) -> Result<Json<Value>, AppError> {
    let table = require_table(request.table)?;
    let (data, filter) = request.data.zip(request.filter).ok_or_else(|| {
        Error::validation("Connection ID, table name, data, and where clause are required")
    })?;
    let executor = state.executor(request.connection_id).await?;

    let outcome = succeeded(
        RecordAccess::new(executor)
            .update(&table, &data, &filter)
            .await?,
    )?;
    let updated = outcome
        .first_row()
        .cloned()
        .ok_or_else(|| Error::not_found("No record matched the where clause"))?;
    Ok(Json(Value::Object(updated)))
}

async fn delete_rows(
    State(state): State<AppState>,
    Json(request): Json<TableDataRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    let table = require_table(request.table)?;
    let filter = request.filter.ok_or_else(|| {
        Error::validation("Connection ID, table name, and where clause are required")
    })?;
    let executor = state.executor(request.connection_id).await?;

    succeeded(RecordAccess::new(executor).delete(&table, &filter).await?)?;
    Ok(Json(SuccessResponse { success: true }))
}

/// Database failures are a 200 with `success: false`; only rejected input
/// changes the status.
async fn execute_query(
    State(state): State<AppState>,
    Json(request): Json<ExecuteQueryRequest>,
) -> Result<Json<QueryOutcome>, QueryError> {
    let query = match (request.connection_id, request.query.as_deref()) {
        (Some(_), Some(query)) if !query.trim().is_empty() => query,
        _ => {
            return Err(QueryError(Error::validation(
                "Connection ID and query are required",
            )));
        }
    };

    let executor = state.executor(request.connection_id).await?;
    let outcome = QueryExecutor::new(executor).execute(query).await?;
    Ok(Json(outcome))
}

async fn list_queries(State(state): State<AppState>) -> Result<Json<Vec<SavedQuery>>, AppError> {
    Ok(Json(state.store.list_queries().await?))
}

async fn create_query(
    State(state): State<AppState>,
    Json(input): Json<SavedQueryInput>,
) -> Result<(StatusCode, Json<SavedQuery>), AppError> {
    let saved = state.store.create_query(&input).await?;
    Ok((StatusCode::CREATED, Json(saved)))
}

async fn list_views(
    State(state): State<AppState>,
) -> Result<Json<Vec<SavedTableView>>, AppError> {
    Ok(Json(state.store.list_views().await?))
}

async fn create_view(
    State(state): State<AppState>,
    Json(input): Json<TableViewInput>,
) -> Result<Json<SavedTableView>, AppError> {
    Ok(Json(state.store.create_view(&input).await?))
}

async fn update_view(
    State(state): State<AppState>,
    Json(request): Json<UpdateTableViewRequest>,
) -> Result<Json<SavedTableView>, AppError> {
    let id = request
        .id
        .ok_or_else(|| Error::validation("ID is required"))?;
    Ok(Json(state.store.update_view(id, &request.patch()).await?))
}

async fn delete_view(
    State(state): State<AppState>,
    Query(query): Query<IdQuery>,
) -> Result<Json<MessageResponse>, AppError> {
    let id = query.id.ok_or_else(|| Error::validation("ID is required"))?;
    state.store.delete_view(id).await?;
    Ok(Json(MessageResponse {
        message: "Table view deleted successfully".to_string(),
    }))
}

async fn dashboard_stats(State(state): State<AppState>) -> Result<Json<DashboardStats>, AppError> {
    Ok(Json(state.store.stats().await?))
}
