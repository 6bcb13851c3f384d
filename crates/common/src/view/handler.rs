use blob_store::HashAlgorithm;
use http::header::{HeaderName, ETAG, LAST_MODIFIED};
use http::Method;
use tracing::{debug, error};

use crate::facet::{ContentFacet, FacetError, PutOutcome};

use super::{responses, Content, Request, Response};

const X_CHECKSUM_SHA1: HeaderName = HeaderName::from_static("x-checksum-sha1");
const X_CHECKSUM_MD5: HeaderName = HeaderName::from_static("x-checksum-md5");

const ALLOWED: [Method; 4] = [Method::GET, Method::HEAD, Method::PUT, Method::DELETE];

/// GET/HEAD/PUT/DELETE onto a [`ContentFacet`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StorageHandler;

impl StorageHandler {
    pub async fn handle(&self, facet: &dyn ContentFacet, request: &Request) -> Response {
        let path = request.path();
        debug!(method = %request.method(), format = facet.format(), path = path, "storage request");

        let result = match *request.method() {
            Method::GET | Method::HEAD => facet.get(path).await.map(|content| match content {
                Some(content) => content_response(content),
                None => responses::not_found(path),
            }),
            Method::PUT => match request.payload() {
                Some(payload) => facet.put(path, payload).await.map(|outcome| match outcome {
                    PutOutcome::Created => responses::created(),
                    PutOutcome::Updated => responses::no_content(),
                }),
                None => Ok(responses::bad_request("missing request body")),
            },
            Method::DELETE => facet.delete(path).await.map(|deleted| {
                if deleted {
                    responses::no_content()
                } else {
                    responses::not_found(path)
                }
            }),
            _ => Ok(responses::method_not_allowed(request.method(), &ALLOWED)),
        };

        result.unwrap_or_else(|e| failure(request, &e))
    }
}

/// 200 with validators and checksum headers.
pub fn content_response(content: Content) -> Response {
    let last_modified = content.last_modified();
    let etag = content.etag();
    let sha1 = content.hash(HashAlgorithm::Sha1).map(str::to_string);
    let md5 = content.hash(HashAlgorithm::Md5).map(str::to_string);

    let mut response = responses::ok(Box::new(content));
    if let Some(when) = last_modified {
        response.set_header(
            LAST_MODIFIED,
            when.format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
        );
    }
    if let Some(etag) = etag {
        response.set_header(ETAG, etag);
    }
    if let Some(sha1) = sha1 {
        response.set_header(X_CHECKSUM_SHA1, sha1);
    }
    if let Some(md5) = md5 {
        response.set_header(X_CHECKSUM_MD5, md5);
    }
    response
}

/// Response for a facet failure.
pub fn failure(request: &Request, e: &FacetError) -> Response {
    let path = request.path();
    match e {
        FacetError::InvalidContent(message) | FacetError::Rejected(message) => {
            debug!(path = path, reason = %message, "request rejected");
            responses::bad_request(message.clone())
        }
        FacetError::Unsupported(message) => {
            debug!(path = path, reason = %message, "operation unsupported");
            responses::method_not_allowed(
                request.method(),
                &[Method::GET, Method::HEAD, Method::DELETE],
            )
        }
        other => {
            error!(path = path, error = %other, "storage failure");
            responses::internal_error("storage failure")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::facet::raw::{RawFacet, RawStrategy};
    use crate::facet::FacetConfig;
    use crate::graph::{MemoryMetadataStore, MetadataStore};
    use crate::storage::StorageFacet;
    use crate::view::{read_all, BytesPayload};
    use blob_store::BlobStore;
    use http::StatusCode;

    async fn raw_facet() -> RawFacet {
        let metadata: Arc<dyn MetadataStore> = Arc::new(MemoryMetadataStore::new());
        let blobs = BlobStore::new_ephemeral().await.unwrap();
        let storage = StorageFacet::new("raw-hosted", metadata, blobs).await.unwrap();
        RawFacet::new(storage, RawStrategy, FacetConfig::default())
    }

    #[tokio::test]
    async fn test_put_get_delete_statuses() {
        let facet = raw_facet().await;
        let handler = StorageHandler;

        let get = Request::get("docs/a.txt");
        assert_eq!(
            handler.handle(&facet, &get).await.status(),
            StatusCode::NOT_FOUND
        );

        let put = Request::put("docs/a.txt", BytesPayload::new("one", Some("text/plain")));
        assert_eq!(handler.handle(&facet, &put).await.status(), StatusCode::CREATED);
        let put = Request::put("docs/a.txt", BytesPayload::new("two", Some("text/plain")));
        assert_eq!(
            handler.handle(&facet, &put).await.status(),
            StatusCode::NO_CONTENT
        );

        let response = handler.handle(&facet, &get).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.header(&ETAG).is_some());
        assert!(response.header(&LAST_MODIFIED).is_some());
        assert_eq!(
            response.header(&X_CHECKSUM_SHA1),
            Some("ad782ecdac770fc6eb9a62e44f90873fb97fb26b")
        );
        let body = read_all(response.payload().unwrap()).await.unwrap();
        assert_eq!(body.as_ref(), b"two");

        let delete = Request::new(Method::DELETE, "docs/a.txt");
        assert_eq!(
            handler.handle(&facet, &delete).await.status(),
            StatusCode::NO_CONTENT
        );
        assert_eq!(
            handler.handle(&facet, &delete).await.status(),
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_unsupported_method_and_invalid_content() {
        let facet = raw_facet().await;
        let handler = StorageHandler;

        let post = Request::new(Method::POST, "a.txt");
        let response = handler.handle(&facet, &post).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            response.header(&http::header::ALLOW),
            Some("GET, HEAD, PUT, DELETE")
        );

        // PNG bytes declared as plain text under strict validation
        let png = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];
        let put = Request::put("image.bin", BytesPayload::new(png, Some("text/plain")));
        assert_eq!(
            handler.handle(&facet, &put).await.status(),
            StatusCode::BAD_REQUEST
        );

        let put = Request::new(Method::PUT, "empty.txt");
        assert_eq!(
            handler.handle(&facet, &put).await.status(),
            StatusCode::BAD_REQUEST
        );
    }
}
