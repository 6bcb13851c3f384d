//! Shared set-up for storage, facet and proxy integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use blob_store::BlobStore;
use bytes::Bytes;
use parking_lot::Mutex;
use tempfile::TempDir;
use url::Url;

use common::facet::maven::{MavenFacet, MavenStrategy, VersionPolicy};
use common::facet::raw::{RawFacet, RawStrategy};
use common::facet::FacetConfig;
use common::graph::{MetadataStore, SqliteMetadataStore};
use common::proxy::{RemoteStorage, RemoteStorageError};
use common::storage::StorageFacet;
use common::view::StreamPayload;

/// Metadata and blobs on disk under one temporary directory.
pub struct TestStores {
    pub metadata: Arc<dyn MetadataStore>,
    pub blobs: BlobStore,
    pub dir: TempDir,
}

impl TestStores {
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        Self::open(dir).await
    }

    /// Open (or reopen) the stores kept in `dir`.
    pub async fn open(dir: TempDir) -> Self {
        let metadata = SqliteMetadataStore::new(&dir.path().join("metadata.db"))
            .await
            .unwrap();
        let blobs = BlobStore::new_local("default", &dir.path().join("blobs"))
            .await
            .unwrap();
        Self {
            metadata: Arc::new(metadata),
            blobs,
            dir,
        }
    }

    pub async fn storage(&self, repository: &str) -> StorageFacet {
        StorageFacet::new(repository, self.metadata.clone(), self.blobs.clone())
            .await
            .unwrap()
    }

    pub async fn maven(&self, repository: &str, policy: VersionPolicy) -> MavenFacet {
        MavenFacet::new(
            self.storage(repository).await,
            MavenStrategy::new(policy),
            FacetConfig {
                strict_content_type_validation: false,
            },
        )
    }

    /// Maven facet that rejects uploads whose declared type contradicts the content.
    pub async fn strict_maven(&self, repository: &str, policy: VersionPolicy) -> MavenFacet {
        MavenFacet::new(
            self.storage(repository).await,
            MavenStrategy::new(policy),
            FacetConfig {
                strict_content_type_validation: true,
            },
        )
    }

    pub async fn raw(&self, repository: &str) -> RawFacet {
        RawFacet::new(
            self.storage(repository).await,
            RawStrategy,
            FacetConfig::default(),
        )
    }
}

pub fn remote_url() -> Url {
    Url::parse("https://repo.example.org/maven2/").unwrap()
}

/// In-memory remote repository that records every request.
#[derive(Debug, Default)]
pub struct FakeRemote {
    items: Mutex<HashMap<String, (Bytes, String)>>,
    requests: Mutex<Vec<String>>,
    offline: AtomicBool,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn publish(&self, path: &str, body: impl Into<Bytes>, content_type: &str) {
        self.items
            .lock()
            .insert(path.to_string(), (body.into(), content_type.to_string()));
    }

    pub fn publish_checksum(&self, path: &str, digest: &str) {
        self.publish(path, format!("{}\n", digest), "text/plain");
    }

    pub fn unpublish(&self, path: &str) {
        self.items.lock().remove(path);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self, path: &str) -> usize {
        self.requests.lock().iter().filter(|p| *p == path).count()
    }
}

#[async_trait]
impl RemoteStorage for FakeRemote {
    async fn retrieve(
        &self,
        base_url: &Url,
        path: &str,
    ) -> Result<StreamPayload, RemoteStorageError> {
        self.requests.lock().push(path.to_string());
        let url = common::proxy::resolve(base_url, path)?;
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteStorageError::Timeout(url.to_string()));
        }
        match self.items.lock().get(path) {
            Some((body, content_type)) => Ok(StreamPayload::from_bytes(
                body.clone(),
                Some(content_type.as_str()),
            )),
            None => Err(RemoteStorageError::NotFound(url.to_string())),
        }
    }
}

pub const JAR: &str = "org/example/widget/1.0/widget-1.0.jar";
pub const POM: &str = "org/example/widget/1.0/widget-1.0.pom";

/// Digests of `b"hello"`.
pub const HELLO_SHA1: &str = "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d";
pub const HELLO_MD5: &str = "5d41402abc4b2a76b9719d911017c592";
