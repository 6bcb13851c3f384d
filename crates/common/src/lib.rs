/**
 * Nested, format namespaced attribute maps
 *  stored on components and assets.
 */
pub mod attributes;
/**
 * Metadata graph store: buckets, components and
 *  assets as vertices with indexed properties.
 * SQLite for durability, in-memory for tests.
 */
pub mod graph;
/**
 * Per-path read/update locks.
 */
pub mod locks;
/**
 * Storage transactions binding a repository's
 *  metadata and blobs together.
 */
pub mod storage;
/**
 * Transport independent requests, responses
 *  and payloads, plus the storage handler.
 */
pub mod view;
/**
 * Format facets: Maven 2, raw and simple
 *  path schemes on top of storage.
 */
pub mod facet;
/**
 * Proxy repositories, the not-found cache
 *  and checksum validation of remote content.
 */
pub mod proxy;
/**
 * HTTP byte range responses.
 */
pub mod partial;

pub mod prelude {
    pub use crate::facet::{ContentFacet, FacetConfig, FacetError, PutOutcome};
    pub use crate::graph::{MemoryMetadataStore, MetadataStore, SqliteMetadataStore};
    pub use crate::partial::PartialFetchHandler;
    pub use crate::proxy::{ChecksumPolicy, ProxyConfig, ProxyFacet};
    pub use crate::storage::StorageFacet;
    pub use crate::view::{Payload, Request, Response, StorageHandler};
}
