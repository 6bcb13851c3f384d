//! Error types for the blob store.

/// Errors that can occur when working with the blob store.
#[derive(Debug, thiserror::Error)]
pub enum BlobStoreError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Object storage error
    #[error("object storage error: {0}")]
    ObjectStore(#[from] object_store::Error),

    /// IO error, including failures of the content stream being written
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Migration error
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Stored hash map could not be decoded
    #[error("invalid hash record: {0}")]
    InvalidHashes(#[from] serde_json::Error),

    /// Unknown hash algorithm name
    #[error("unknown hash algorithm: {0}")]
    UnknownAlgorithm(String),

    /// A blob reference string that is not `store@id`
    #[error("invalid blob reference: {0}")]
    InvalidBlobRef(String),

    /// Blob reference that belongs to a different store
    #[error("blob reference {0} does not belong to store '{1}'")]
    ForeignBlobRef(String, String),

    /// Blob not found
    #[error("blob not found: {0}")]
    NotFound(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// S3 bucket not found - must be created before use
    #[error("S3 bucket '{0}' does not exist. Create it before starting the server.")]
    BucketNotFound(String),
}

/// Result type alias for blob store operations.
pub type Result<T> = std::result::Result<T, BlobStoreError>;
