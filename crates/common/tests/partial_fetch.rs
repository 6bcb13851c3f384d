//! Range requests against stored content

mod common;

use ::common::partial::PartialFetchHandler;
use ::common::view::{read_all, BytesPayload, Request, StorageHandler};
use http::header::{CONTENT_RANGE, RANGE};
use http::{HeaderValue, Method, StatusCode};

use common::TestStores;

const PATH: &str = "files/alphabet.txt";
const ALPHABET: &str = "abcdefghijklmnopqrstuvwxyz";

async fn serve(facet: &dyn ::common::facet::ContentFacet, range: Option<&str>) -> ::common::view::Response {
    let mut request = Request::new(Method::GET, PATH);
    if let Some(range) = range {
        request = request.with_header(RANGE, HeaderValue::from_str(range).unwrap());
    }
    let response = StorageHandler.handle(facet, &request).await;
    PartialFetchHandler::default().apply(&request, response)
}

#[tokio::test]
async fn test_ranges_over_stored_content() {
    let stores = TestStores::new().await;
    let raw = stores.raw("files").await;
    let put = Request::put(PATH, BytesPayload::new(ALPHABET, Some("text/plain")));
    assert_eq!(StorageHandler.handle(&raw, &put).await.status(), StatusCode::CREATED);

    let response = serve(&raw, Some("bytes=0-4")).await;
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.header(&CONTENT_RANGE), Some("0-4/26"));
    let payload = response.payload().unwrap();
    assert_eq!(payload.content_type(), Some("text/plain"));
    assert_eq!(read_all(payload).await.unwrap().as_ref(), b"abcde");

    let response = serve(&raw, Some("bytes=20-")).await;
    assert_eq!(response.header(&CONTENT_RANGE), Some("20-25/26"));
    assert_eq!(read_all(response.payload().unwrap()).await.unwrap().as_ref(), b"uvwxyz");

    let response = serve(&raw, Some("bytes=30-40")).await;
    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(response.header(&CONTENT_RANGE), Some("bytes */26"));

    let response = serve(&raw, Some("bytes=0-1,4-5")).await;
    assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);

    let response = serve(&raw, Some("bytes=five-six")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_all(response.payload().unwrap()).await.unwrap().as_ref(), ALPHABET.as_bytes());

    let response = serve(&raw, None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_missing_content_is_not_ranged() {
    let stores = TestStores::new().await;
    let raw = stores.raw("files").await;
    let response = serve(&raw, Some("bytes=0-4")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.header(&CONTENT_RANGE).is_none());
}
