//! PostgreSQL-backed control-plane storage

mod migrations;
mod models;
mod postgres;

pub use migrations::run_migrations;
pub use postgres::PostgresStore;
