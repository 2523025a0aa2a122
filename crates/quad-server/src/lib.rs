//! HTTP surface of the admin backend

pub mod error;
pub mod rest;
pub mod types;

pub use error::{AppError, QueryError};
pub use rest::{AppState, create_router};
pub use types::*;
