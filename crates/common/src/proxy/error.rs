use reqwest::StatusCode;

use crate::attributes::AttributeError;
use crate::facet::FacetError;
use crate::storage::StorageError;

/// Failures of the local side of a proxy: reading or writing item attributes
/// and deleting items.
#[derive(Debug, thiserror::Error)]
pub enum LocalStorageError {
    #[error("item not found: {0}")]
    ItemNotFound(String),
    #[error("unsupported storage operation: {0}")]
    Unsupported(String),
    #[error("item has no attributes: {0}")]
    MissingAttributes(String),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("attribute error: {0}")]
    Attributes(#[from] AttributeError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<FacetError> for LocalStorageError {
    fn from(e: FacetError) -> Self {
        match e {
            FacetError::LocalStorage(e) => e,
            FacetError::Storage(e) => LocalStorageError::Storage(e),
            FacetError::Attributes(e) => LocalStorageError::Attributes(e),
            FacetError::Io(e) => LocalStorageError::Io(e),
            other => LocalStorageError::Unsupported(other.to_string()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RemoteStorageError {
    #[error("not found on remote: {0}")]
    NotFound(String),
    #[error("remote timed out: {0}")]
    Timeout(String),
    #[error("remote returned {status} for {url}")]
    Status { status: StatusCode, url: String },
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("URL parse error: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("error reading remote content: {0}")]
    Body(#[from] std::io::Error),
}

impl RemoteStorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteStorageError::NotFound(_))
    }
}
