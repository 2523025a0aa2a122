//! Mapping of the error taxonomy onto HTTP responses

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use quad_core::Error;

/// HTTP status for an error class
pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::Validation(_) | Error::ForbiddenStatement(_) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Conflict(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn log(err: &Error, status: StatusCode) {
    if status.is_server_error() {
        tracing::error!(error = %err, status = status.as_u16(), "Request failed");
    } else {
        tracing::debug!(error = %err, status = status.as_u16(), "Request rejected");
    }
}

/// Error handling for the JSON routes: `{ "error": message }`
pub struct AppError(pub Error);

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        log(&self.0, status);
        let json = serde_json::json!({
            "error": self.0.to_string()
        });
        (status, Json(json)).into_response()
    }
}

/// Error handling for the query console: `{ "success": false, "error": message }`
pub struct QueryError(pub Error);

impl From<Error> for QueryError {
    fn from(err: Error) -> Self {
        QueryError(err)
    }
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        log(&self.0, status);
        let json = serde_json::json!({
            "success": false,
            "error": self.0.to_string()
        });
        (status, Json(json)).into_response()
    }
}
