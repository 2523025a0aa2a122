//! PostgreSQL-backed control-plane store

use super::migrations::run_migrations;
use super::models::{ConnectionRow, SavedQueryRow, TableViewRow};
use crate::types::DUPLICATE_VIEW;
use crate::{
    AdminStore, ConnectionInput, ConnectionStore, SavedQueryInput, SavedQueryStore,
    TableViewInput, TableViewPatch, TableViewStore, connection_not_found, view_not_found,
};
use async_trait::async_trait;
use quad_core::{
    AdminDbConfig, ConnectionProfile, ConnectionSummary, ConnectionTarget, CredentialCipher,
    DashboardStats, Error, Result, SavedQuery, SavedTableView,
};
use sqlx::postgres::{PgConnectOptions, PgPool};
use std::sync::Arc;

const SELECT_QUERIES: &str = r#"
    SELECT sq.id, sq.name, sq.description, sq.sql_query, sq.connection_id,
           dc.name AS connection_name, sq.is_public, sq.created_at, sq.updated_at
    FROM saved_queries sq
    LEFT JOIN database_connections dc ON sq.connection_id = dc.id
    ORDER BY sq.created_at DESC, sq.id DESC
"#;

const INSERT_QUERY: &str = r#"
    WITH inserted AS (
        INSERT INTO saved_queries (name, description, sql_query, connection_id, is_public)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
    )
    SELECT i.id, i.name, i.description, i.sql_query, i.connection_id,
           dc.name AS connection_name, i.is_public, i.created_at, i.updated_at
    FROM inserted i
    LEFT JOIN database_connections dc ON i.connection_id = dc.id
"#;

const SELECT_VIEWS: &str = r#"
    SELECT stv.id, stv.connection_id, dc.name AS connection_name, stv.table_name,
           stv.display_name, stv.icon, stv.is_active, stv.sort_order,
           stv.created_at, stv.updated_at
    FROM saved_table_views stv
    JOIN database_connections dc ON stv.connection_id = dc.id
    WHERE dc.is_active = TRUE
    ORDER BY stv.sort_order ASC, stv.created_at ASC, stv.id ASC
"#;

const INSERT_VIEW: &str = r#"
    WITH inserted AS (
        INSERT INTO saved_table_views (connection_id, table_name, display_name, icon, sort_order)
        VALUES ($1, $2, $3, $4, (SELECT COALESCE(MAX(sort_order), 0) + 1 FROM saved_table_views))
        RETURNING *
    )
    SELECT i.id, i.connection_id, dc.name AS connection_name, i.table_name,
           i.display_name, i.icon, i.is_active, i.sort_order, i.created_at, i.updated_at
    FROM inserted i
    LEFT JOIN database_connections dc ON i.connection_id = dc.id
"#;

const UPDATE_VIEW: &str = r#"
    WITH updated AS (
        UPDATE saved_table_views
        SET display_name = COALESCE($2, display_name),
            icon = COALESCE($3, icon),
            sort_order = COALESCE($4, sort_order),
            updated_at = CURRENT_TIMESTAMP
        WHERE id = $1
        RETURNING *
    )
    SELECT u.id, u.connection_id, dc.name AS connection_name, u.table_name,
           u.display_name, u.icon, u.is_active, u.sort_order, u.created_at, u.updated_at
    FROM updated u
    LEFT JOIN database_connections dc ON u.connection_id = dc.id
"#;

/// Map a control-plane driver error into the error taxonomy
fn store_error(err: sqlx::Error) -> Error {
    match err {
        sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
            // unique_violation; the only unique key is (connection_id, table_name)
            Some("23505") => Error::Conflict(DUPLICATE_VIEW.to_string()),
            // foreign_key_violation
            Some("23503") => Error::validation("Referenced connection does not exist"),
            _ => Error::database(db_err.message().to_string()),
        },
        sqlx::Error::PoolTimedOut => {
            Error::database("Connection timed out: control-plane pool exhausted")
        }
        other => Error::database(other.to_string()),
    }
}

/// PostgreSQL-backed control-plane store
pub struct PostgresStore {
    pool: PgPool,
    cipher: Arc<CredentialCipher>,
}

impl PostgresStore {
    /// Wrap a pool and run migrations
    pub async fn new(pool: PgPool, cipher: Arc<CredentialCipher>) -> Result<Self> {
        run_migrations(&pool).await.map_err(store_error)?;
        tracing::debug!("Control-plane schema ready");
        Ok(Self { pool, cipher })
    }

    /// Create from an existing pool whose schema is already in place
    pub fn from_pool(pool: PgPool, cipher: Arc<CredentialCipher>) -> Self {
        Self { pool, cipher }
    }

    /// Connect options for the control-plane database
    pub fn connect_options(config: &AdminDbConfig) -> PgConnectOptions {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.user);

        match &config.password {
            Some(password) => options.password(password),
            None => options,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_connection(&self, id: i64) -> Result<Option<ConnectionProfile>> {
        let row: Option<ConnectionRow> =
            sqlx::query_as("SELECT * FROM database_connections WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(store_error)?;

        row.map(ConnectionProfile::try_from).transpose()
    }
}

#[async_trait]
impl ConnectionStore for PostgresStore {
    async fn create(&self, input: &ConnectionInput) -> Result<ConnectionSummary> {
        let (fields, password) = input.for_create()?;
        let password_encrypted = self.cipher.encrypt(password)?;

        let row: ConnectionRow = sqlx::query_as(
            r#"
            INSERT INTO database_connections
                (name, host, port, database_name, username, password_encrypted, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(&fields.name)
        .bind(&fields.host)
        .bind(i32::from(fields.port))
        .bind(&fields.database_name)
        .bind(&fields.username)
        .bind(&password_encrypted)
        .bind(fields.is_active)
        .fetch_one(&self.pool)
        .await
        .map_err(store_error)?;

        let profile = ConnectionProfile::try_from(row)?;
        tracing::debug!(connection_id = profile.id, "Created connection profile");
        Ok(ConnectionSummary::from(&profile))
    }

    async fn update(&self, id: i64, input: &ConnectionInput) -> Result<ConnectionSummary> {
        let fields = input.for_update()?;
        let password_encrypted = match input.new_password() {
            Some(password) => Some(self.cipher.encrypt(password)?),
            None => None,
        };

        let row: Option<ConnectionRow> = sqlx::query_as(
            r#"
            UPDATE database_connections
            SET name = $1, host = $2, port = $3, database_name = $4, username = $5,
                password_encrypted = COALESCE($6, password_encrypted),
                is_active = $7, updated_at = CURRENT_TIMESTAMP
            WHERE id = $8
            RETURNING *
            "#,
        )
        .bind(&fields.name)
        .bind(&fields.host)
        .bind(i32::from(fields.port))
        .bind(&fields.database_name)
        .bind(&fields.username)
        .bind(password_encrypted)
        .bind(fields.is_active)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        let profile = ConnectionProfile::try_from(row.ok_or_else(|| connection_not_found(id))?)?;
        tracing::debug!(connection_id = id, "Updated connection profile");
        Ok(ConnectionSummary::from(&profile))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM database_connections WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;

        if result.rows_affected() == 0 {
            return Err(connection_not_found(id));
        }
        tracing::debug!(connection_id = id, "Deleted connection profile");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ConnectionSummary>> {
        let rows: Vec<ConnectionRow> = sqlx::query_as(
            "SELECT * FROM database_connections ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.into_iter()
            .map(|row| ConnectionProfile::try_from(row).map(|p| ConnectionSummary::from(&p)))
            .collect()
    }

    async fn get(&self, id: i64) -> Result<ConnectionSummary> {
        self.fetch_connection(id)
            .await?
            .map(|p| ConnectionSummary::from(&p))
            .ok_or_else(|| connection_not_found(id))
    }

    async fn resolve(&self, id: i64) -> Result<ConnectionTarget> {
        let profile = self
            .fetch_connection(id)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| connection_not_found(id))?;

        Ok(ConnectionTarget {
            password: self.cipher.decrypt(&profile.password_encrypted)?,
            host: profile.host,
            port: profile.port,
            database_name: profile.database_name,
            username: profile.username,
        })
    }
}

#[async_trait]
impl SavedQueryStore for PostgresStore {
    async fn list_queries(&self) -> Result<Vec<SavedQuery>> {
        let rows: Vec<SavedQueryRow> = sqlx::query_as(SELECT_QUERIES)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(rows.into_iter().map(SavedQuery::from).collect())
    }

    async fn create_query(&self, input: &SavedQueryInput) -> Result<SavedQuery> {
        let fields = input.validate()?;

        let row: SavedQueryRow = sqlx::query_as(INSERT_QUERY)
            .bind(&fields.name)
            .bind(&fields.description)
            .bind(&fields.sql_query)
            .bind(fields.connection_id)
            .bind(fields.is_public)
            .fetch_one(&self.pool)
            .await
            .map_err(store_error)?;

        Ok(SavedQuery::from(row))
    }
}

#[async_trait]
impl TableViewStore for PostgresStore {
    async fn list_views(&self) -> Result<Vec<SavedTableView>> {
        let rows: Vec<TableViewRow> = sqlx::query_as(SELECT_VIEWS)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(rows.into_iter().map(SavedTableView::from).collect())
    }

    async fn create_view(&self, input: &TableViewInput) -> Result<SavedTableView> {
        let fields = input.validate()?;

        let existing: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM saved_table_views WHERE connection_id = $1 AND table_name = $2",
        )
        .bind(fields.connection_id)
        .bind(&fields.table_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        if existing.is_some() {
            return Err(Error::Conflict(DUPLICATE_VIEW.to_string()));
        }

        // A concurrent insert of the same pair still surfaces as Conflict
        // through the unique constraint
        let row: TableViewRow = sqlx::query_as(INSERT_VIEW)
            .bind(fields.connection_id)
            .bind(&fields.table_name)
            .bind(&fields.display_name)
            .bind(&fields.icon)
            .fetch_one(&self.pool)
            .await
            .map_err(store_error)?;

        Ok(SavedTableView::from(row))
    }

    async fn update_view(&self, id: i64, patch: &TableViewPatch) -> Result<SavedTableView> {
        let row: Option<TableViewRow> = sqlx::query_as(UPDATE_VIEW)
            .bind(id)
            .bind(&patch.display_name)
            .bind(&patch.icon)
            .bind(patch.sort_order)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        row.map(SavedTableView::from)
            .ok_or_else(|| view_not_found(id))
    }

    async fn delete_view(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM saved_table_views WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;

        if result.rows_affected() == 0 {
            return Err(view_not_found(id));
        }
        Ok(())
    }
}

#[async_trait]
impl AdminStore for PostgresStore {
    async fn stats(&self) -> Result<DashboardStats> {
        let total_connections: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM database_connections WHERE is_active = TRUE",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(store_error)?;

        let saved_queries: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM saved_queries")
            .fetch_one(&self.pool)
            .await
            .map_err(store_error)?;

        Ok(DashboardStats {
            total_connections,
            active_tables: 0,
            saved_queries,
            total_records: 0,
        })
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(())
    }
}
