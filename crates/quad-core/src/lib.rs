//! Core types for the Quad admin backend
//!
//! This crate provides the error taxonomy, configuration, shared data model
//! and the credential cipher used by every other crate in the workspace.

pub mod config;
pub mod crypto;
pub mod error;
pub mod model;

// Re-exports
pub use config::{
    AdminDbConfig, LogFormat, ObservabilityConfig, PoolConfig, QuadConfig, SecurityConfig,
    ServerConfig,
};
pub use crypto::CredentialCipher;
pub use error::{Error, Result};
pub use model::{
    ColumnDescriptor, ConnectionProfile, ConnectionSummary, ConnectionTarget, DashboardStats,
    PoolKey, QueryOutcome, Record, SavedQuery, SavedTableView, TableDescriptor, deserialize_opt_id,
};
