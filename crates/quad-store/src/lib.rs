//! Control-plane storage for the admin backend
//!
//! Connection profiles (with encrypted passwords), saved queries and saved
//! table views live here, behind traits with an in-memory and a PostgreSQL
//! implementation.

use async_trait::async_trait;
use quad_core::{
    ConnectionSummary, ConnectionTarget, DashboardStats, Result, SavedQuery, SavedTableView,
};

pub mod database;
pub mod inmemory;
pub mod types;

pub use database::PostgresStore;
pub use inmemory::InMemoryStore;
pub use types::{ConnectionInput, SavedQueryInput, TableViewInput, TableViewPatch};

/// Stored connection profiles
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    async fn create(&self, input: &ConnectionInput) -> Result<ConnectionSummary>;

    /// Replace a profile's fields; an empty password keeps the stored one
    async fn update(&self, id: i64, input: &ConnectionInput) -> Result<ConnectionSummary>;

    async fn delete(&self, id: i64) -> Result<()>;

    /// Newest first
    async fn list(&self) -> Result<Vec<ConnectionSummary>>;

    async fn get(&self, id: i64) -> Result<ConnectionSummary>;

    /// Decrypted target of an active profile
    async fn resolve(&self, id: i64) -> Result<ConnectionTarget>;
}

#[async_trait]
pub trait SavedQueryStore: Send + Sync {
    async fn list_queries(&self) -> Result<Vec<SavedQuery>>;
    async fn create_query(&self, input: &SavedQueryInput) -> Result<SavedQuery>;
}

/// Sidebar shortcuts to tables, unique per connection and table
#[async_trait]
pub trait TableViewStore: Send + Sync {
    /// Views of active connections, by sort order then creation time
    async fn list_views(&self) -> Result<Vec<SavedTableView>>;
    async fn create_view(&self, input: &TableViewInput) -> Result<SavedTableView>;
    async fn update_view(&self, id: i64, patch: &TableViewPatch) -> Result<SavedTableView>;
    async fn delete_view(&self, id: i64) -> Result<()>;
}

/// Everything the HTTP layer needs from the control plane
#[async_trait]
pub trait AdminStore: ConnectionStore + SavedQueryStore + TableViewStore {
    async fn stats(&self) -> Result<DashboardStats>;

    /// Readiness check
    async fn ping(&self) -> Result<()>;
}

fn connection_not_found(id: i64) -> quad_core::Error {
    quad_core::Error::not_found(format!("Connection {} not found", id))
}

fn view_not_found(id: i64) -> quad_core::Error {
    quad_core::Error::not_found(format!("Table view {} not found", id))
}
