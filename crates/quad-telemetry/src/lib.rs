//! # Quad Telemetry
//!
//! Structured logging setup and span helpers for statements sent to target
//! databases.

mod spans;
mod tracer;

pub use spans::{SqlSpanAttributes, record_sql_outcome, sql_span};
pub use tracer::{env_filter, init_telemetry};

/// Span field names for database statements.
///
/// Names follow the OpenTelemetry database semantic conventions where one
/// exists.
pub mod attributes {
    pub const DB_SYSTEM: &str = "db.system";
    pub const DB_OPERATION: &str = "db.operation";
    pub const DB_TABLE: &str = "db.sql.table";
    pub const DB_ROWS: &str = "db.rows";
    pub const ELAPSED_MS: &str = "elapsed_ms";

    pub const SYSTEM_NAME: &str = "postgresql";
}
