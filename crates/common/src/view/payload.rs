use std::collections::BTreeMap;
use std::fmt;
use std::io;

use async_trait::async_trait;
use blob_store::{Blob, ByteStream, HashAlgorithm};
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use parking_lot::Mutex;

/// Response or request body that can be opened as a byte stream.
#[async_trait]
pub trait Payload: Send + Sync + fmt::Debug {
    fn content_type(&self) -> Option<&str>;

    /// Size in bytes, when known up front.
    fn size(&self) -> Option<u64>;

    /// Open a fresh stream over the content.
    async fn open(&self) -> io::Result<ByteStream>;
}

/// Drain a payload into memory.
pub async fn read_all(payload: &dyn Payload) -> io::Result<Bytes> {
    let chunks: Vec<Bytes> = payload.open().await?.try_collect().await?;
    let mut out = BytesMut::new();
    for chunk in chunks {
        out.extend_from_slice(&chunk);
    }
    Ok(out.freeze())
}

/// In-memory payload.
#[derive(Debug, Clone)]
pub struct BytesPayload {
    bytes: Bytes,
    content_type: Option<String>,
}

impl BytesPayload {
    pub fn new(bytes: impl Into<Bytes>, content_type: Option<&str>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.map(str::to_string),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(text.into(), Some(mime::TEXT_PLAIN_UTF_8.as_ref()))
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }
}

#[async_trait]
impl Payload for BytesPayload {
    fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    fn size(&self) -> Option<u64> {
        Some(self.bytes.len() as u64)
    }

    async fn open(&self) -> io::Result<ByteStream> {
        let bytes = self.bytes.clone();
        Ok(stream::once(async move { Ok(bytes) }).boxed())
    }
}

/// Payload over a stream that can be opened once: a remote response body
/// or a request body being uploaded.
pub struct StreamPayload {
    content_type: Option<String>,
    size: Option<u64>,
    stream: Mutex<Option<ByteStream>>,
}

impl StreamPayload {
    pub fn new(content_type: Option<String>, size: Option<u64>, stream: ByteStream) -> Self {
        Self {
            content_type,
            size,
            stream: Mutex::new(Some(stream)),
        }
    }

    pub fn from_bytes(bytes: impl Into<Bytes>, content_type: Option<&str>) -> Self {
        let bytes = bytes.into();
        let size = bytes.len() as u64;
        Self::new(
            content_type.map(str::to_string),
            Some(size),
            stream::once(async move { Ok(bytes) }).boxed(),
        )
    }
}

impl fmt::Debug for StreamPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamPayload")
            .field("content_type", &self.content_type)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Payload for StreamPayload {
    fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    fn size(&self) -> Option<u64> {
        self.size
    }

    async fn open(&self) -> io::Result<ByteStream> {
        self.stream
            .lock()
            .take()
            .ok_or_else(|| io::Error::other("stream payload already consumed"))
    }
}

/// Stored content of an asset: its blob plus what the facet knows about it.
#[derive(Debug, Clone)]
pub struct Content {
    blob: Blob,
    content_type: String,
    last_modified: Option<DateTime<Utc>>,
    last_verified: Option<DateTime<Utc>>,
}

impl Content {
    pub fn new(
        blob: Blob,
        content_type: impl Into<String>,
        last_modified: Option<DateTime<Utc>>,
        last_verified: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            blob,
            content_type: content_type.into(),
            last_modified,
            last_verified,
        }
    }

    pub fn blob(&self) -> &Blob {
        &self.blob
    }

    pub fn hashes(&self) -> &BTreeMap<HashAlgorithm, String> {
        &self.blob.metrics().hashes
    }

    pub fn hash(&self, algorithm: HashAlgorithm) -> Option<&str> {
        self.blob.metrics().hash(algorithm)
    }

    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.last_modified
    }

    pub fn last_verified(&self) -> Option<DateTime<Utc>> {
        self.last_verified
    }

    /// Strong entity tag derived from the SHA-1 digest.
    pub fn etag(&self) -> Option<String> {
        self.hash(HashAlgorithm::Sha1)
            .map(|sha1| format!("\"{}\"", sha1))
    }
}

#[async_trait]
impl Payload for Content {
    fn content_type(&self) -> Option<&str> {
        Some(&self.content_type)
    }

    fn size(&self) -> Option<u64> {
        Some(self.blob.metrics().content_size)
    }

    async fn open(&self) -> io::Result<ByteStream> {
        self.blob.open().await.map_err(io::Error::other)
    }
}
