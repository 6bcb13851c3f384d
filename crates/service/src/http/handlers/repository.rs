use std::io;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};

use common::view::{self, StreamPayload};
use futures::{StreamExt, TryStreamExt};

use crate::ServiceState;

/// Serve `/repository/:name/*path` from the named repository.
pub async fn repository_handler(
    State(state): State<ServiceState>,
    Path((name, path)): Path<(String, String)>,
    method: Method,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let Some(repository) = state.repository(&name) else {
        tracing::debug!(repository = %name, "unknown repository");
        return (
            StatusCode::NOT_FOUND,
            format!("repository '{}' not found", name),
        )
            .into_response();
    };

    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let size = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    let head = method == Method::HEAD;
    let mut request = view::Request::new(method.clone(), path.trim_start_matches('/'))
        .with_headers(headers);
    if method == Method::PUT {
        // Streamed, never buffered in memory
        let stream = body.into_data_stream().map_err(io::Error::other).boxed();
        request = request.with_payload(StreamPayload::new(content_type, size, stream));
    }

    let response = repository.handle(&request).await;
    into_http_response(response, head).await
}

/// Convert a view response, streaming its payload as the body.
pub async fn into_http_response(response: view::Response, head: bool) -> Response {
    let (status, mut headers, payload) = response.into_parts();

    let mut body = Body::empty();
    if let Some(payload) = payload {
        if let Some(value) = payload
            .content_type()
            .and_then(|ct| HeaderValue::from_str(ct).ok())
        {
            headers.insert(CONTENT_TYPE, value);
        }
        if let Some(size) = payload.size() {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(size));
        }
        if !head {
            match payload.open().await {
                Ok(stream) => body = Body::from_stream(stream),
                Err(e) => {
                    tracing::error!(error = %e, "failed to open response payload");
                    return (StatusCode::INTERNAL_SERVER_ERROR, "failed to read content")
                        .into_response();
                }
            }
        }
    }

    let mut http_response = Response::new(body);
    *http_response.status_mut() = status;
    *http_response.headers_mut() = headers;
    http_response
}
