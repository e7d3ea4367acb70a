//! HTTP mapping for the service error taxonomy.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use causeway_core::error::Error;
use serde_json::json;
use tracing::error;

/// Wrapper so taxonomy errors convert straight into HTTP responses with
/// a `{error, message}` body.
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) | Error::InvalidState(_) => StatusCode::CONFLICT,
            Error::StaleToken(_) => StatusCode::GONE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        }

        let body = Json(json!({
            "error": error_code(&self.0),
            "message": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}

fn error_code(err: &Error) -> &'static str {
    match err {
        Error::InvalidRequest(_) => "invalid_request",
        Error::Conflict(_) => "conflict",
        Error::NotFound(_) => "not_found",
        Error::InvalidState(_) => "invalid_state",
        Error::StaleToken(_) => "stale_token",
        Error::Unauthorized(_) => "unauthorized",
        Error::Storage(_) => "storage",
        Error::Signing(_) => "signing",
        Error::Deployment(_) => "deployment",
        Error::Config(_) => "config",
        Error::Io(_) => "io",
    }
}
