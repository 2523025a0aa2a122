use quad_core::{Error, Result, deserialize_opt_id};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 5432;
pub const DEFAULT_VIEW_ICON: &str = "table";
pub(crate) const DUPLICATE_VIEW: &str = "This table view is already saved to sidebar";

/// Connection form submission. Every field is optional on the wire so that
/// missing values surface as validation errors rather than decode failures.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub database_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    /// Plaintext; empty or absent on update keeps the stored ciphertext
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

/// Validated, password-free part of a [`ConnectionInput`]
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionFields {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub database_name: String,
    pub username: String,
    pub is_active: bool,
}

impl ConnectionInput {
    fn fields(&self, message: &str) -> Result<ConnectionFields> {
        match (
            present(&self.name),
            present(&self.host),
            present(&self.database_name),
            present(&self.username),
        ) {
            (Some(name), Some(host), Some(database_name), Some(username)) => Ok(ConnectionFields {
                name: name.to_string(),
                host: host.to_string(),
                port: self.port.unwrap_or(DEFAULT_PORT),
                database_name: database_name.to_string(),
                username: username.to_string(),
                is_active: self.is_active.unwrap_or(true),
            }),
            _ => Err(Error::validation(message)),
        }
    }

    /// Fields and password for a new profile; every field is required
    pub fn for_create(&self) -> Result<(ConnectionFields, &str)> {
        let message = "All fields are required";
        let fields = self.fields(message)?;
        let password = self.new_password().ok_or_else(|| Error::validation(message))?;
        Ok((fields, password))
    }

    /// Fields for an update; the password is optional
    pub fn for_update(&self) -> Result<ConnectionFields> {
        self.fields("Name, host, database name, and username are required")
    }

    /// A replacement password, if one was supplied
    pub fn new_password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SavedQueryInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sql_query: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    pub connection_id: Option<i64>,
    #[serde(default)]
    pub is_public: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SavedQueryFields {
    pub name: String,
    pub description: Option<String>,
    pub sql_query: String,
    pub connection_id: i64,
    pub is_public: bool,
}

impl SavedQueryInput {
    pub fn validate(&self) -> Result<SavedQueryFields> {
        match (present(&self.name), present(&self.sql_query), self.connection_id) {
            (Some(name), Some(sql_query), Some(connection_id)) => Ok(SavedQueryFields {
                name: name.to_string(),
                description: present(&self.description).map(str::to_string),
                sql_query: sql_query.to_string(),
                connection_id,
                is_public: self.is_public.unwrap_or(false),
            }),
            _ => Err(Error::validation(
                "Name, SQL query, and connection ID are required",
            )),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableViewInput {
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    pub connection_id: Option<i64>,
    #[serde(default)]
    pub table_name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableViewFields {
    pub connection_id: i64,
    pub table_name: String,
    pub display_name: String,
    pub icon: String,
}

impl TableViewInput {
    /// Required fields checked, defaults applied
    pub fn validate(&self) -> Result<TableViewFields> {
        match (self.connection_id, present(&self.table_name)) {
            (Some(connection_id), Some(table_name)) => Ok(TableViewFields {
                connection_id,
                table_name: table_name.to_string(),
                display_name: present(&self.display_name)
                    .unwrap_or(table_name)
                    .to_string(),
                icon: present(&self.icon).unwrap_or(DEFAULT_VIEW_ICON).to_string(),
            }),
            _ => Err(Error::validation(
                "Connection ID and table name are required",
            )),
        }
    }
}

/// Partial update of a saved table view; absent fields keep their value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableViewPatch {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub sort_order: Option<i32>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}
