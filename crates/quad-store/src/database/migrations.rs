//! Idempotent schema setup for the control-plane database

use sqlx::{Pool, Postgres};

/// SQL for creating the connection profiles table
const CREATE_CONNECTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS database_connections (
    id BIGSERIAL PRIMARY KEY,
    name TEXT NOT NULL,
    host TEXT NOT NULL,
    port INTEGER NOT NULL DEFAULT 5432,
    database_name TEXT NOT NULL,
    username TEXT NOT NULL,
    password_encrypted TEXT NOT NULL,
    is_active BOOLEAN NOT NULL DEFAULT TRUE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#;

/// SQL for creating the saved queries table
const CREATE_SAVED_QUERIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS saved_queries (
    id BIGSERIAL PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT,
    sql_query TEXT NOT NULL,
    connection_id BIGINT NOT NULL REFERENCES database_connections(id) ON DELETE CASCADE,
    is_public BOOLEAN NOT NULL DEFAULT FALSE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#;

/// SQL for creating the saved table views table
const CREATE_SAVED_TABLE_VIEWS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS saved_table_views (
    id BIGSERIAL PRIMARY KEY,
    connection_id BIGINT NOT NULL REFERENCES database_connections(id) ON DELETE CASCADE,
    table_name TEXT NOT NULL,
    display_name TEXT NOT NULL,
    icon TEXT NOT NULL DEFAULT 'table',
    is_active BOOLEAN NOT NULL DEFAULT TRUE,
    sort_order INTEGER NOT NULL DEFAULT 0,
    created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
    UNIQUE (connection_id, table_name)
);
"#;

/// Run migrations for PostgreSQL
pub async fn run_migrations(pool: &Pool<Postgres>) -> Result<(), sqlx::Error> {
    sqlx::query(CREATE_CONNECTIONS_TABLE).execute(pool).await?;
    sqlx::query(CREATE_SAVED_QUERIES_TABLE).execute(pool).await?;
    sqlx::query(CREATE_SAVED_TABLE_VIEWS_TABLE).execute(pool).await?;
    create_indexes(pool).await?;
    Ok(())
}

/// Create indexes for the listing orders
async fn create_indexes(pool: &Pool<Postgres>) -> Result<(), sqlx::Error> {
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_connections_created ON database_connections(created_at DESC)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_table_views_order ON saved_table_views(sort_order, created_at)")
        .execute(pool)
        .await?;
    Ok(())
}
