//! Byte range responses.
//!
//! [`PartialFetchHandler`] post-processes a successful response whose
//! payload size is known, slicing it to the single range named by the
//! request's `Range` header.

mod payload;
mod range;

use http::header::{CONTENT_RANGE, RANGE};
use http::StatusCode;
use tracing::debug;

use crate::view::{responses, Request, Response};

pub use payload::PartialPayload;
pub use range::{ByteRange, RangeParser, RangeRequest};

#[derive(Debug, Clone, Default)]
pub struct PartialFetchHandler {
    parser: RangeParser,
}

impl PartialFetchHandler {
    pub fn new(parser: RangeParser) -> Self {
        Self { parser }
    }

    pub fn apply(&self, request: &Request, mut response: Response) -> Response {
        if !response.status().is_success() {
            return response;
        }
        let Some(size) = response.payload().and_then(|p| p.size()) else {
            return response;
        };
        let Some(header) = request.header(&RANGE) else {
            return response;
        };

        let range = match self.parser.parse(header) {
            None => return response,
            Some(RangeRequest::Multiple) => {
                return responses::not_implemented("Multiple ranges not supported.")
            }
            Some(RangeRequest::Single(range)) => range,
        };

        if !range.is_satisfiable(size) {
            debug!(path = request.path(), range = %range, size = size, "range not satisfiable");
            return responses::range_not_satisfiable(size);
        }

        let (lower, upper) = range.clamp(size);
        let Some(payload) = response.take_payload() else {
            return response;
        };
        response.set_status(StatusCode::PARTIAL_CONTENT);
        response.set_payload(Box::new(PartialPayload::new(payload, lower, upper)));
        response.set_header(CONTENT_RANGE, format!("{}-{}/{}", lower, upper, size));
        response
    }
}
