//! Canned responses.

use http::header::{ALLOW, CONTENT_RANGE};
use http::StatusCode;

use super::{BytesPayload, Payload, Response};

fn with_message(status: StatusCode, message: impl Into<String>) -> Response {
    Response::with_payload(status, Box::new(BytesPayload::text(message)))
}

pub fn ok(payload: Box<dyn Payload>) -> Response {
    Response::with_payload(StatusCode::OK, payload)
}

pub fn created() -> Response {
    Response::new(StatusCode::CREATED)
}

pub fn no_content() -> Response {
    Response::new(StatusCode::NO_CONTENT)
}

pub fn bad_request(message: impl Into<String>) -> Response {
    with_message(StatusCode::BAD_REQUEST, message)
}

pub fn not_found(message: impl Into<String>) -> Response {
    with_message(StatusCode::NOT_FOUND, message)
}

pub fn method_not_allowed(method: &http::Method, allowed: &[http::Method]) -> Response {
    let mut response = with_message(
        StatusCode::METHOD_NOT_ALLOWED,
        format!("Method not allowed: {}", method),
    );
    let allow = allowed
        .iter()
        .map(http::Method::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    response.set_header(ALLOW, allow);
    response
}

pub fn not_implemented(message: impl Into<String>) -> Response {
    with_message(StatusCode::NOT_IMPLEMENTED, message)
}

/// 416 carrying the size of the full content.
pub fn range_not_satisfiable(content_size: u64) -> Response {
    let mut response = Response::new(StatusCode::RANGE_NOT_SATISFIABLE);
    response.set_header(CONTENT_RANGE, format!("bytes */{}", content_size));
    response
}

pub fn internal_error(message: impl Into<String>) -> Response {
    with_message(StatusCode::INTERNAL_SERVER_ERROR, message)
}
