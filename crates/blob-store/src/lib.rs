//! Blob storage for repository content.
//!
//! Blob content lives in pluggable object storage (S3/MinIO/local
//! filesystem/memory) while SQLite tracks each blob's headers, size,
//! digests and lifecycle state.
//!
//! # Example
//!
//! ```rust,no_run
//! use blob_store::{BlobHeaders, BlobStore, HashAlgorithm};
//! use bytes::Bytes;
//! use futures::StreamExt;
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), blob_store::BlobStoreError> {
//! let store = BlobStore::new_local("default", Path::new("/tmp/blobs")).await?;
//!
//! let content = futures::stream::iter(vec![Ok(Bytes::from("hello"))]).boxed();
//! let blob = store
//!     .create(content, BlobHeaders::new("hello.txt", "admin"), &HashAlgorithm::REQUIRED)
//!     .await?;
//! store.commit(&[blob.blob_ref().clone()]).await?;
//! # Ok(())
//! # }
//! ```

mod blob;
mod blob_store;
mod database;
mod error;
mod hashing;
mod storage;

pub use blob::{Blob, BlobHeaders, BlobMetrics, BlobRef, ByteStream};
pub use blob_store::{BlobStore, DEFAULT_STORE_NAME};
pub use error::{BlobStoreError, Result};
pub use hashing::{HashAlgorithm, MultiHasher};
pub use storage::ObjectStoreConfig;
