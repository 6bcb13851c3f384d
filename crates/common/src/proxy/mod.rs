//! Proxy repositories: remote retrieval, the not-found cache and checksum
//! validation of fetched content.

mod checksum;
mod error;
mod facet;
mod local;
mod not_found_cache;
mod remote;

pub use checksum::{
    parse_digest, ChecksumContentValidator, ChecksumPolicy, RemoteHash, ValidationOutcome,
};
pub use error::{LocalStorageError, RemoteStorageError};
pub use facet::{LocalRepository, ProxyConfig, ProxyFacet};
pub use local::{AttributeUpdate, ItemAttributes, LocalItemStorage};
pub use not_found_cache::NotFoundCache;
pub use remote::{resolve, HttpRemoteStorage, RemoteStorage};
