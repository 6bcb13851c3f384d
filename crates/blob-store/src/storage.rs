//! Object storage backend abstraction (S3/MinIO/local filesystem/memory).

use std::path::PathBuf;
use std::sync::Arc;

use futures::{StreamExt, TryStreamExt};
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, WriteMultipart};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::blob::ByteStream;
use crate::error::{BlobStoreError, Result};
use crate::hashing::MultiHasher;

/// Number of multipart chunks allowed in flight while streaming a blob.
const MAX_CONCURRENT_PARTS: usize = 4;

/// Configuration for the object storage backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObjectStoreConfig {
    /// In-memory storage (for testing)
    #[default]
    Memory,

    /// Local filesystem storage
    Local {
        /// Path to the storage directory
        path: PathBuf,
    },

    /// S3-compatible storage (AWS S3, MinIO, etc.)
    S3 {
        /// S3 endpoint URL (e.g., "http://localhost:9000" for MinIO)
        endpoint: String,
        /// Access key ID
        access_key: String,
        /// Secret access key
        secret_key: String,
        /// Bucket name
        bucket: String,
        /// Optional region (defaults to "us-east-1")
        region: Option<String>,
    },
}

/// Wrapper around different object storage backends.
#[derive(Debug, Clone)]
pub(crate) struct Storage {
    inner: Arc<dyn ObjectStore>,
}

impl Storage {
    /// Create a new storage backend from configuration.
    pub async fn new(config: ObjectStoreConfig) -> Result<Self> {
        let inner: Arc<dyn ObjectStore> = match &config {
            ObjectStoreConfig::Memory => Arc::new(InMemory::new()),

            ObjectStoreConfig::Local { path } => {
                tokio::fs::create_dir_all(path).await?;
                Arc::new(
                    LocalFileSystem::new_with_prefix(path)
                        .map_err(|e| BlobStoreError::InvalidConfig(e.to_string()))?,
                )
            }

            ObjectStoreConfig::S3 {
                endpoint,
                access_key,
                secret_key,
                bucket,
                region,
            } => {
                let store: Arc<dyn ObjectStore> = Arc::new(
                    AmazonS3Builder::new()
                        .with_endpoint(endpoint)
                        .with_access_key_id(access_key)
                        .with_secret_access_key(secret_key)
                        .with_bucket_name(bucket)
                        .with_region(region.as_deref().unwrap_or("us-east-1"))
                        .with_allow_http(endpoint.starts_with("http://"))
                        .build()
                        .map_err(|e| BlobStoreError::InvalidConfig(e.to_string()))?,
                );

                // Fail fast when the bucket is missing
                let prefix = ObjectPath::from("");
                let first = {
                    let mut listing = store.list(Some(&prefix));
                    listing.try_next().await
                };
                match first {
                    Ok(_) => {}
                    Err(object_store::Error::NotFound { .. }) => {
                        return Err(BlobStoreError::BucketNotFound(bucket.clone()));
                    }
                    Err(e) if e.to_string().contains("NoSuchBucket") => {
                        return Err(BlobStoreError::BucketNotFound(bucket.clone()));
                    }
                    Err(e) => return Err(e.into()),
                }

                store
            }
        };

        Ok(Self { inner })
    }

    /// Object path for blob content, fanned out by the first two id characters.
    fn content_path(blob_id: &str) -> ObjectPath {
        let prefix = blob_id.get(..2).unwrap_or(blob_id);
        ObjectPath::from(format!("content/{}/{}.bytes", prefix, blob_id))
    }

    /// Stream content into storage, feeding every chunk through `hasher`.
    ///
    /// Returns the number of bytes written. The upload is aborted if the
    /// source stream or the backend fails part way.
    pub async fn put_stream(
        &self,
        blob_id: &str,
        mut stream: ByteStream,
        hasher: &mut MultiHasher,
    ) -> Result<u64> {
        let path = Self::content_path(blob_id);
        let upload = self.inner.put_multipart(&path).await?;
        let mut writer = WriteMultipart::new(upload);
        let mut size = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    Self::abort(writer, blob_id).await;
                    return Err(e.into());
                }
            };
            if let Err(e) = writer.wait_for_capacity(MAX_CONCURRENT_PARTS).await {
                Self::abort(writer, blob_id).await;
                return Err(e.into());
            }
            hasher.update(&chunk);
            size += chunk.len() as u64;
            writer.write(&chunk);
        }

        writer.finish().await?;
        Ok(size)
    }

    async fn abort(writer: WriteMultipart, blob_id: &str) {
        if let Err(e) = writer.abort().await {
            warn!(blob_id = blob_id, error = %e, "failed to abort multipart upload");
        }
    }

    /// Open blob content as a stream, or `None` if the object is missing.
    pub async fn get_stream(&self, blob_id: &str) -> Result<Option<ByteStream>> {
        let path = Self::content_path(blob_id);
        match self.inner.get(&path).await {
            Ok(result) => Ok(Some(
                result
                    .into_stream()
                    .map_err(std::io::Error::other)
                    .boxed(),
            )),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete blob content; a missing object is not an error.
    pub async fn delete(&self, blob_id: &str) -> Result<()> {
        let path = Self::content_path(blob_id);
        match self.inner.delete(&path).await {
            Ok(()) => Ok(()),
            Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
impl Storage {
    pub fn memory() -> Self {
        Self {
            inner: Arc::new(InMemory::new()),
        }
    }

    pub async fn exists(&self, blob_id: &str) -> Result<bool> {
        match self.inner.head(&Self::content_path(blob_id)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::HashAlgorithm;
    use bytes::Bytes;

    fn chunks(parts: &[&'static str]) -> ByteStream {
        let items: Vec<std::io::Result<Bytes>> =
            parts.iter().map(|p| Ok(Bytes::from_static(p.as_bytes()))).collect();
        futures::stream::iter(items).boxed()
    }

    async fn read(storage: &Storage, blob_id: &str) -> Vec<u8> {
        let stream = storage.get_stream(blob_id).await.unwrap().unwrap();
        let parts: Vec<Bytes> = stream.try_collect().await.unwrap();
        parts.concat()
    }

    #[tokio::test]
    async fn test_memory_storage_streaming() {
        let storage = Storage::memory();
        let mut hasher = MultiHasher::new(&[HashAlgorithm::Sha1]);

        let size = storage
            .put_stream("ab12", chunks(&["hello ", "world"]), &mut hasher)
            .await
            .unwrap();
        assert_eq!(size, 11);
        assert_eq!(read(&storage, "ab12").await, b"hello world");
        assert_eq!(
            hasher.finish()[&HashAlgorithm::Sha1],
            "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed"
        );

        storage.delete("ab12").await.unwrap();
        assert!(!storage.exists("ab12").await.unwrap());
        assert!(storage.get_stream("ab12").await.unwrap().is_none());

        // Deleting twice is fine
        storage.delete("ab12").await.unwrap();
    }

    #[tokio::test]
    async fn test_local_storage() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = ObjectStoreConfig::Local {
            path: temp_dir.path().to_path_buf(),
        };
        let storage = Storage::new(config).await.unwrap();
        let mut hasher = MultiHasher::new(&[]);

        storage
            .put_stream("cd34", chunks(&["test data"]), &mut hasher)
            .await
            .unwrap();
        assert_eq!(read(&storage, "cd34").await, b"test data");

        let file_path = temp_dir.path().join("content").join("cd").join("cd34.bytes");
        assert!(file_path.exists());
    }

    #[tokio::test]
    async fn test_failed_stream_leaves_nothing_behind() {
        let storage = Storage::memory();
        let mut hasher = MultiHasher::new(&[]);
        let failing = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(std::io::Error::other("connection reset")),
        ])
        .boxed();

        let result = storage.put_stream("ef56", failing, &mut hasher).await;
        assert!(matches!(result, Err(BlobStoreError::Io(_))));
        assert!(!storage.exists("ef56").await.unwrap());
    }
}
