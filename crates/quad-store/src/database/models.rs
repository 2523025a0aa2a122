//! Database models for control-plane storage

use chrono::{DateTime, Utc};
use quad_core::{ConnectionProfile, Error, SavedQuery, SavedTableView};

/// Connection profile row, including the ciphertext
#[derive(Debug, Clone, sqlx::FromRow)]
pub(super) struct ConnectionRow {
    pub id: i64,
    pub name: String,
    pub host: String,
    pub port: i32,
    pub database_name: String,
    pub username: String,
    pub password_encrypted: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Saved query joined with its connection's name
#[derive(Debug, Clone, sqlx::FromRow)]
pub(super) struct SavedQueryRow {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub sql_query: String,
    pub connection_id: i64,
    pub connection_name: Option<String>,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Saved table view joined with its connection's name
#[derive(Debug, Clone, sqlx::FromRow)]
pub(super) struct TableViewRow {
    pub id: i64,
    pub connection_id: i64,
    pub connection_name: Option<String>,
    pub table_name: String,
    pub display_name: String,
    pub icon: String,
    pub is_active: bool,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ConnectionRow> for ConnectionProfile {
    type Error = Error;

    fn try_from(row: ConnectionRow) -> Result<Self, Self::Error> {
        let port = u16::try_from(row.port).map_err(|_| {
            Error::database(format!("Connection {} has invalid port {}", row.id, row.port))
        })?;

        Ok(ConnectionProfile {
            id: row.id,
            name: row.name,
            host: row.host,
            port,
            database_name: row.database_name,
            username: row.username,
            password_encrypted: row.password_encrypted,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl From<SavedQueryRow> for SavedQuery {
    fn from(row: SavedQueryRow) -> Self {
        SavedQuery {
            id: row.id,
            name: row.name,
            description: row.description,
            sql_query: row.sql_query,
            connection_id: row.connection_id,
            connection_name: row.connection_name,
            is_public: row.is_public,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl From<TableViewRow> for SavedTableView {
    fn from(row: TableViewRow) -> Self {
        SavedTableView {
            id: row.id,
            connection_id: row.connection_id,
            connection_name: row.connection_name,
            table_name: row.table_name,
            display_name: row.display_name,
            icon: row.icon,
            is_active: row.is_active,
            sort_order: row.sort_order,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(port: i32) -> ConnectionRow {
        ConnectionRow {
            id: 1,
            name: "local".to_string(),
            host: "localhost".to_string(),
            port,
            database_name: "app".to_string(),
            username: "postgres".to_string(),
            password_encrypted: "00:00".to_string(),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_connection_row_conversion() {
        let profile = ConnectionProfile::try_from(row(5432)).unwrap();
        assert_eq!(profile.port, 5432);
        assert!(matches!(
            ConnectionProfile::try_from(row(70000)),
            Err(Error::Database(_))
        ));
    }
}
