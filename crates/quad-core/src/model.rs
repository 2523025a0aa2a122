//! Shared data model for connection profiles, reflected schemas and query results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A loosely-typed row. Key order follows the result's column order.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Stored connection profile as persisted in the control plane
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionProfile {
    pub id: i64,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub database_name: String,
    pub username: String,
    /// `hex(iv):hex(ciphertext)`
    pub password_encrypted: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Public view of a profile; never carries the password in any form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionSummary {
    pub id: i64,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub database_name: String,
    pub username: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&ConnectionProfile> for ConnectionSummary {
    fn from(profile: &ConnectionProfile) -> Self {
        Self {
            id: profile.id,
            name: profile.name.clone(),
            host: profile.host.clone(),
            port: profile.port,
            database_name: profile.database_name.clone(),
            username: profile.username.clone(),
            is_active: profile.is_active,
            created_at: profile.created_at,
            updated_at: profile.updated_at,
        }
    }
}

/// Decrypted address and credentials of one target database
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionTarget {
    pub host: String,
    pub port: u16,
    pub database_name: String,
    pub username: String,
    pub password: String,
}

impl ConnectionTarget {
    pub fn pool_key(&self) -> PoolKey {
        PoolKey {
            host: self.host.clone(),
            port: self.port,
            database_name: self.database_name.clone(),
            username: self.username.clone(),
        }
    }
}

impl fmt::Debug for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database_name", &self.database_name)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Identity of a pooled target: one pool per distinct key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub host: String,
    pub port: u16,
    pub database_name: String,
    pub username: String,
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.host, self.port, self.database_name, self.username
        )
    }
}

/// Reflected description of one table or view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub table_name: String,
    pub table_schema: String,
    pub table_type: String,
    pub columns: Vec<ColumnDescriptor>,
    /// Point-in-time count taken while describing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<i64>,
}

impl TableDescriptor {
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.column_name == name)
    }

    pub fn primary_key(&self) -> Vec<&ColumnDescriptor> {
        self.columns.iter().filter(|c| c.is_primary_key).collect()
    }

    pub fn has_primary_key(&self) -> bool {
        self.columns.iter().any(|c| c.is_primary_key)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub column_name: String,
    pub data_type: String,
    pub udt_schema: String,
    pub udt_name: String,
    /// "YES" or "NO", as reported by the catalog
    pub is_nullable: String,
    pub column_default: Option<String>,
    pub character_maximum_length: Option<i64>,
    pub numeric_precision: Option<i64>,
    pub numeric_scale: Option<i64>,
    pub is_primary_key: bool,
    pub is_foreign_key: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foreign_table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foreign_column: Option<String>,
}

impl ColumnDescriptor {
    pub fn nullable(&self) -> bool {
        self.is_nullable == "YES"
    }

    pub fn is_array(&self) -> bool {
        self.data_type == "ARRAY" || self.udt_name.starts_with('_')
    }
}

/// Uniform envelope returned by every data-access and query operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Record>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Milliseconds
    pub execution_time: u64,
}

impl QueryOutcome {
    pub fn success(
        data: Vec<Record>,
        columns: Vec<String>,
        row_count: u64,
        execution_time: u64,
    ) -> Self {
        Self {
            success: true,
            data: Some(data),
            columns: Some(columns),
            row_count: Some(row_count),
            error: None,
            execution_time,
        }
    }

    pub fn failure(error: impl Into<String>, execution_time: u64) -> Self {
        Self {
            success: false,
            data: None,
            columns: None,
            row_count: None,
            error: Some(error.into()),
            execution_time,
        }
    }

    /// First returned row, as produced by `RETURNING *`
    pub fn first_row(&self) -> Option<&Record> {
        self.data.as_ref().and_then(|rows| rows.first())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedQuery {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub sql_query: String,
    pub connection_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_name: Option<String>,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-connection sidebar shortcut to a table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedTableView {
    pub id: i64,
    pub connection_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_name: Option<String>,
    pub table_name: String,
    pub display_name: String,
    pub icon: String,
    pub is_active: bool,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_connections: i64,
    pub active_tables: i64,
    pub saved_queries: i64,
    pub total_records: i64,
}

/// Deserialize an optional id sent either as a JSON number or as a numeric
/// string, as HTML forms and query strings tend to produce.
pub fn deserialize_opt_id<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(i64),
        Text(String),
    }

    match Option::<RawId>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawId::Number(id)) => Ok(Some(id)),
        Some(RawId::Text(raw)) if raw.trim().is_empty() => Ok(None),
        Some(RawId::Text(raw)) => raw
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid id: {}", raw))),
    }
}
