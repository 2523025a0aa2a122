//! Target-database access for the admin panel
//!
//! This crate owns everything that talks to a user's database: the pool
//! registry, schema reflection, generic record access and the ad-hoc
//! query console.

pub mod decode;
pub mod executor;
pub mod ident;
pub mod pool;
pub mod query;
pub mod records;
pub mod reflect;

// Re-exports
pub use executor::{PgExecutor, RowSet, SqlExecutor, SqlValue, db_error, run_timed};
pub use ident::{DEFAULT_SCHEMA, TableRef, quote_ident};
pub use pool::{ConnectionTest, ExecutorProvider, PoolRegistry, PoolSettings};
pub use query::{FORBIDDEN_MESSAGE, QueryExecutor, is_allowed};
pub use records::{DEFAULT_LIMIT, ReadOptions, RecordAccess, SortDirection};
pub use reflect::SchemaReflector;
