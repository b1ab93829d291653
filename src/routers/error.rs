//! HTTP error responses for failures that occur before the stream opens.
//!
//! Once the response headers have flushed, failures are surfaced in-band as
//! a terminal `done` event instead (see `streaming::multiplexer`).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rag_protocol::ErrorBody;

pub fn bad_request(kind: impl Into<String>, message: impl Into<String>) -> Response {
    create_error(StatusCode::BAD_REQUEST, kind, message)
}

pub fn unauthorized(kind: impl Into<String>, message: impl Into<String>) -> Response {
    create_error(StatusCode::UNAUTHORIZED, kind, message)
}

pub fn internal_error(kind: impl Into<String>, message: impl Into<String>) -> Response {
    create_error(StatusCode::INTERNAL_SERVER_ERROR, kind, message)
}

pub fn service_unavailable(kind: impl Into<String>, message: impl Into<String>) -> Response {
    create_error(StatusCode::SERVICE_UNAVAILABLE, kind, message)
}

pub fn create_error(
    status: StatusCode,
    kind: impl Into<String>,
    message: impl Into<String>,
) -> Response {
    (status, Json(ErrorBody::new(kind, message))).into_response()
}
