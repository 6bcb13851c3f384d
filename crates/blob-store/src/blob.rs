//! Blob references, headers and read handles.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::{BlobStoreError, Result};
use crate::hashing::HashAlgorithm;
use crate::storage::Storage;

/// A stream of content chunks, as read from or written to a blob.
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Opaque reference to a blob: the owning store's name plus the blob id.
///
/// Rendered and parsed as `store@blob_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct BlobRef {
    store: String,
    blob_id: String,
}

impl BlobRef {
    pub fn new(store: impl Into<String>, blob_id: impl Into<String>) -> Self {
        Self {
            store: store.into(),
            blob_id: blob_id.into(),
        }
    }

    pub fn store(&self) -> &str {
        &self.store
    }

    pub fn blob_id(&self) -> &str {
        &self.blob_id
    }
}

impl fmt::Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.store, self.blob_id)
    }
}

impl FromStr for BlobRef {
    type Err = BlobStoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('@') {
            Some((store, id)) if !store.is_empty() && !id.is_empty() => Ok(Self::new(store, id)),
            _ => Err(BlobStoreError::InvalidBlobRef(s.to_string())),
        }
    }
}

impl From<BlobRef> for String {
    fn from(value: BlobRef) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for BlobRef {
    type Error = BlobStoreError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Descriptive headers recorded with every blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobHeaders {
    /// `BlobName`: usually the repository path the blob was written for.
    pub name: String,
    /// `CreatedBy`: the principal that wrote the blob.
    pub created_by: String,
}

impl BlobHeaders {
    pub fn new(name: impl Into<String>, created_by: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            created_by: created_by.into(),
        }
    }
}

/// Size, creation time and digests of a stored blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobMetrics {
    pub created: DateTime<Utc>,
    pub content_size: u64,
    pub hashes: BTreeMap<HashAlgorithm, String>,
}

impl BlobMetrics {
    pub fn hash(&self, algorithm: HashAlgorithm) -> Option<&str> {
        self.hashes.get(&algorithm).map(String::as_str)
    }
}

/// A committed blob that can be opened for reading any number of times.
#[derive(Debug, Clone)]
pub struct Blob {
    blob_ref: BlobRef,
    headers: BlobHeaders,
    metrics: BlobMetrics,
    storage: Storage,
}

impl Blob {
    pub(crate) fn new(
        blob_ref: BlobRef,
        headers: BlobHeaders,
        metrics: BlobMetrics,
        storage: Storage,
    ) -> Self {
        Self {
            blob_ref,
            headers,
            metrics,
            storage,
        }
    }

    pub fn blob_ref(&self) -> &BlobRef {
        &self.blob_ref
    }

    pub fn headers(&self) -> &BlobHeaders {
        &self.headers
    }

    pub fn metrics(&self) -> &BlobMetrics {
        &self.metrics
    }

    /// Open the blob content as a stream.
    pub async fn open(&self) -> Result<ByteStream> {
        self.storage
            .get_stream(self.blob_ref.blob_id())
            .await?
            .ok_or_else(|| BlobStoreError::NotFound(self.blob_ref.to_string()))
    }

    /// Read the whole blob into memory.
    pub async fn read_all(&self) -> Result<Bytes> {
        use futures::TryStreamExt;

        let chunks: Vec<Bytes> = self.open().await?.try_collect().await?;
        Ok(Bytes::from(chunks.concat()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_ref_display_and_parse() {
        let blob_ref = BlobRef::new("default", "3f1c");
        assert_eq!(blob_ref.to_string(), "default@3f1c");
        assert_eq!("default@3f1c".parse::<BlobRef>().unwrap(), blob_ref);

        assert!("no-separator".parse::<BlobRef>().is_err());
        assert!("@id".parse::<BlobRef>().is_err());
        assert!("store@".parse::<BlobRef>().is_err());
    }

    #[test]
    fn test_blob_ref_serde() {
        let blob_ref = BlobRef::new("s3", "abc");
        let json = serde_json::to_string(&blob_ref).unwrap();
        assert_eq!(json, "\"s3@abc\"");
        let back: BlobRef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, blob_ref);
    }
}
