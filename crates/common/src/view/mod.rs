//! Transport independent requests and responses.
//!
//! The HTTP layer converts to and from these types; handlers such as
//! [`StorageHandler`] and [`crate::partial::PartialFetchHandler`] only see
//! them.

mod handler;
mod payload;
pub mod responses;

use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::{Method, StatusCode};
use tracing::warn;

pub use handler::{content_response, failure, StorageHandler};
pub use payload::{read_all, BytesPayload, Content, Payload, StreamPayload};

#[derive(Debug)]
pub struct Request {
    method: Method,
    path: String,
    headers: HeaderMap,
    payload: Option<Box<dyn Payload>>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            payload: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn put(path: impl Into<String>, payload: impl Payload + 'static) -> Self {
        Self::new(Method::PUT, path).with_payload(payload)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn with_payload(mut self, payload: impl Payload + 'static) -> Self {
        self.payload = Some(Box::new(payload));
        self
    }

    pub fn with_boxed_payload(mut self, payload: Box<dyn Payload>) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Header value as a string; non-ASCII values are treated as absent.
    pub fn header(&self, name: &HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn payload(&self) -> Option<&dyn Payload> {
        self.payload.as_deref()
    }
}

#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    payload: Option<Box<dyn Payload>>,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            payload: None,
        }
    }

    pub fn with_payload(status: StatusCode, payload: Box<dyn Payload>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            payload: Some(payload),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Set a header, skipping values that are not valid header text.
    pub fn set_header(&mut self, name: HeaderName, value: impl AsRef<str>) {
        match HeaderValue::from_str(value.as_ref()) {
            Ok(value) => {
                self.headers.insert(name, value);
            }
            Err(_) => warn!(header = %name, value = value.as_ref(), "dropping invalid header value"),
        }
    }

    pub fn payload(&self) -> Option<&dyn Payload> {
        self.payload.as_deref()
    }

    pub fn take_payload(&mut self) -> Option<Box<dyn Payload>> {
        self.payload.take()
    }

    pub fn set_payload(&mut self, payload: Box<dyn Payload>) {
        self.payload = Some(payload);
    }

    pub fn into_parts(self) -> (StatusCode, HeaderMap, Option<Box<dyn Payload>>) {
        (self.status, self.headers, self.payload)
    }
}
