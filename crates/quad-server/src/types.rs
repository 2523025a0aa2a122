use quad_core::{ConnectionTarget, Record, deserialize_opt_id};
use quad_db::SortDirection;
use quad_store::TableViewPatch;
use serde::{Deserialize, Serialize};

/// `?connectionId=` on schema routes
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionQuery {
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    pub connection_id: Option<i64>,
}

/// Paging and ordering for `GET /api/tables/data`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDataQuery {
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    pub connection_id: Option<i64>,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
    #[serde(default)]
    pub order_by: Option<String>,
    #[serde(default)]
    pub order_direction: Option<SortDirection>,
}

/// Body of the record write routes
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDataRequest {
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    pub connection_id: Option<i64>,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub data: Option<Record>,
    #[serde(default, rename = "where")]
    pub filter: Option<Record>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRowsResponse {
    pub rows: Vec<Record>,
    pub columns: Vec<String>,
    pub row_count: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteQueryRequest {
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    pub connection_id: Option<i64>,
    #[serde(default)]
    pub query: Option<String>,
}

/// Unsaved connection details for a connectivity check
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TestConnectionRequest {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub database_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl TestConnectionRequest {
    /// `None` unless every field is present and non-empty
    pub fn target(&self) -> Option<ConnectionTarget> {
        let filled = |v: &Option<String>| v.clone().filter(|s| !s.is_empty());
        Some(ConnectionTarget {
            host: filled(&self.host)?,
            port: self.port.filter(|p| *p != 0)?,
            database_name: filled(&self.database_name)?,
            username: filled(&self.username)?,
            password: filled(&self.password)?,
        })
    }
}

/// `PUT /api/saved-table-views` body: the id plus a partial update
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTableViewRequest {
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    pub id: Option<i64>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub sort_order: Option<i32>,
}

impl UpdateTableViewRequest {
    pub fn patch(&self) -> TableViewPatch {
        TableViewPatch {
            display_name: self.display_name.clone(),
            icon: self.icon.clone(),
            sort_order: self.sort_order,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdQuery {
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    pub id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}
