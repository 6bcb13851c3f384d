use super::{VertexClass, VertexId};
use crate::attributes::AttributeError;

#[derive(thiserror::Error, Debug)]
pub enum GraphError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("attribute error: {0}")]
    Attributes(#[from] AttributeError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// A save would give two vertices of the same class the same unique key
    #[error("duplicate {class} key {key}={value}")]
    DuplicateKey {
        class: VertexClass,
        key: String,
        value: String,
    },
    #[error("vertex not found: {0}")]
    VertexNotFound(VertexId),
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}
