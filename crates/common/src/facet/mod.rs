//! Format facets: path schemes mapped onto components and assets.
//!
//! A facet is a [`StorageContentFacet`] parameterized by a
//! [`FormatStrategy`]. The strategy turns a request path into a
//! [`Locator`]; the facet does the storage work the same way for every
//! format.

mod content;
pub mod maven;
mod mime;
pub mod raw;
pub mod simple;
mod spool;
mod strategy;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::attributes::AttributeError;
use crate::proxy::LocalStorageError;
use crate::storage::StorageError;
use crate::view::{Content, Payload};

pub(crate) use content::ContentSource;
pub use content::StorageContentFacet;
pub use mime::{essence, MimeSupport, SNIFF_LEN};
pub use spool::TempSpool;
pub use strategy::{ComponentLocator, FormatStrategy, Locator};

/// Format attribute holding the identity key of components and assets.
pub const A_KEY: &str = "key";
/// Format attribute recording when an asset's content was last written.
pub const A_CONTENT_LAST_MODIFIED: &str = "contentLastModified";
/// Format attribute recording when an asset was last checked against its remote.
pub const A_LAST_VERIFIED: &str = "lastVerified";

/// Created-by header for blobs written through a facet.
pub const CREATED_BY_UNKNOWN: &str = "unknown";

#[derive(thiserror::Error, Debug)]
pub enum FacetError {
    /// Content rejected by content type validation
    #[error("invalid content: {0}")]
    InvalidContent(String),
    /// Path or coordinates rejected by the format
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("unsupported operation: {0}")]
    Unsupported(String),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("local storage error: {0}")]
    LocalStorage(#[from] LocalStorageError),
    #[error("attribute error: {0}")]
    Attributes(#[from] AttributeError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FacetError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// A new asset was created
    Created,
    /// An existing asset's content was replaced
    Updated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FacetConfig {
    /// Reject content whose type cannot be determined or contradicts the declared type
    pub strict_content_type_validation: bool,
}

impl Default for FacetConfig {
    fn default() -> Self {
        Self {
            strict_content_type_validation: true,
        }
    }
}

/// Get/put/delete of content by repository path.
#[async_trait]
pub trait ContentFacet: Send + Sync + fmt::Debug {
    fn format(&self) -> &str;

    /// Stored content at `path`, `None` if absent.
    async fn get(&self, path: &str) -> Result<Option<Content>>;

    /// Idempotent upsert of the content at `path`.
    async fn put(&self, path: &str, payload: &dyn Payload) -> Result<PutOutcome>;

    /// Delete the content at `path`. Returns `false` if nothing was there.
    async fn delete(&self, path: &str) -> Result<bool>;

    async fn last_verified(&self, path: &str) -> Result<Option<DateTime<Utc>>>;

    /// Record a verification time. Returns `false` if nothing is stored at `path`.
    async fn set_last_verified(&self, path: &str, verified: DateTime<Utc>) -> Result<bool>;
}

/// Repository relative form of a request path: no leading or doubled
/// slashes. `.` and `..` segments are rejected.
pub fn normalize_path(path: &str) -> Result<String> {
    let mut segments = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" => continue,
            "." | ".." => {
                return Err(FacetError::Rejected(format!(
                    "relative segment in path '{}'",
                    path
                )))
            }
            s => segments.push(s),
        }
    }
    if segments.is_empty() {
        return Err(FacetError::Rejected("empty path".to_string()));
    }
    Ok(segments.join("/"))
}

/// True for `.sha1` / `.md5` checksum side files.
pub fn is_checksum_path(path: &str) -> bool {
    blob_store::HashAlgorithm::REQUIRED
        .iter()
        .any(|a| path.ends_with(a.extension()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/a//b/c.jar").unwrap(), "a/b/c.jar");
        assert_eq!(normalize_path("a/b/").unwrap(), "a/b");
        assert!(normalize_path("/").is_err());
        assert!(normalize_path("a/../b").is_err());
    }

    #[test]
    fn test_checksum_paths() {
        assert!(is_checksum_path("a/b.jar.sha1"));
        assert!(is_checksum_path("a/b.jar.md5"));
        assert!(!is_checksum_path("a/b.jar"));
        assert!(!is_checksum_path("a/b.jar.asc"));
    }
}
