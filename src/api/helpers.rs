//! Common response builders for the route handlers.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;

use crate::errors::RelayError;

/// Returns a 200 OK response with `body` serialized as JSON.
pub fn ok_json<T: Serialize>(body: T) -> Response {
    (StatusCode::OK, Json(body)).into_response()
}

/// Returns an error response with the given status code and message.
#[must_use]
pub fn err_response(status_code: u16, message: &str) -> Response {
    let status = StatusCode::from_u16(status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({ "error": message }))).into_response()
}

/// Maps a [`RelayError`] onto its status code and `{error}` body.
#[must_use]
pub fn relay_error_response(error: &RelayError) -> Response {
    err_response(error.status_code(), &error.to_string())
}

/// `{success: false, error}` with the given status, for the diagnostic route.
#[must_use]
pub fn diagnostic_error(status_code: u16, message: &str) -> Response {
    let status = StatusCode::from_u16(status_code).unwrap_or(StatusCode::OK);
    (status, Json(json!({ "success": false, "error": message }))).into_response()
}
