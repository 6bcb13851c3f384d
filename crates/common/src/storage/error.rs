use blob_store::BlobStoreError;

use crate::attributes::AttributeError;
use crate::graph::GraphError;

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("metadata error: {0}")]
    Graph(#[from] GraphError),
    #[error("blob store error: {0}")]
    Blob(#[from] BlobStoreError),
    #[error("attribute error: {0}")]
    Attributes(#[from] AttributeError),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;
