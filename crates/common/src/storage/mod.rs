//! Transactional access to a repository's components, assets and blobs.

mod error;
mod node;
mod tx;

use std::sync::Arc;

use blob_store::{Blob, BlobHeaders, BlobRef, BlobStore, ByteStream, HashAlgorithm};
use tracing::{debug, warn};

use crate::graph::{MetadataStore, VertexClass, VertexId};

pub use error::{Result, StorageError};
pub use node::{
    Asset, Component, A_CHECKSUM, P_BLOB_REF, P_BLOB_UPDATED, P_CONTENT_TYPE, P_FORMAT, P_GROUP,
    P_NAME, P_PATH, P_SIZE, P_VERSION,
};
pub use tx::StorageTx;

/// Storage bound to one repository: its bucket, metadata store and blob store.
#[derive(Debug, Clone)]
pub struct StorageFacet {
    repository: Arc<str>,
    bucket: VertexId,
    metadata: Arc<dyn MetadataStore>,
    blobs: BlobStore,
}

impl StorageFacet {
    /// Bind a repository, creating its bucket on first use.
    pub async fn new(
        repository: &str,
        metadata: Arc<dyn MetadataStore>,
        blobs: BlobStore,
    ) -> Result<Self> {
        let mut tx = metadata.begin().await?;
        let bucket = tx.bucket(repository).await?.id();
        tx.commit().await?;
        debug!(repository = repository, bucket = %bucket, "storage bound");

        Ok(Self {
            repository: Arc::from(repository),
            bucket,
            metadata,
            blobs,
        })
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn blob_store(&self) -> &BlobStore {
        &self.blobs
    }

    /// Stream content into a pending blob without opening a transaction.
    ///
    /// The blob stays invisible until a transaction adopts it and commits;
    /// otherwise [`StorageFacet::discard_blob`] or the pending sweep removes it.
    pub async fn create_blob(
        &self,
        stream: ByteStream,
        headers: BlobHeaders,
        algorithms: &[HashAlgorithm],
    ) -> Result<Blob> {
        Ok(self.blobs.create(stream, headers, algorithms).await?)
    }

    pub async fn discard_blob(&self, blob_ref: &BlobRef) {
        if let Err(e) = self.blobs.delete(blob_ref).await {
            warn!(blob = %blob_ref, error = %e, "failed to discard pending blob");
        }
    }

    /// Declare a property unique among components of this store.
    pub fn ensure_unique_component_key(&self, key: &str) {
        self.metadata
            .ensure_unique_index(VertexClass::Component, key);
    }

    /// Declare a property unique among assets of this store.
    pub fn ensure_unique_asset_key(&self, key: &str) {
        self.metadata.ensure_unique_index(VertexClass::Asset, key);
    }

    pub async fn open_tx(&self) -> Result<StorageTx> {
        let meta = self.metadata.begin().await?;
        Ok(StorageTx::new(
            self.repository.clone(),
            self.bucket,
            meta,
            self.blobs.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MemoryMetadataStore;
    use bytes::Bytes;
    use futures::stream::{self, StreamExt};

    async fn facet() -> StorageFacet {
        let metadata: Arc<dyn MetadataStore> = Arc::new(MemoryMetadataStore::new());
        let blobs = BlobStore::new_ephemeral().await.unwrap();
        StorageFacet::new("hosted", metadata, blobs).await.unwrap()
    }

    fn stream_of(data: &'static [u8]) -> blob_store::ByteStream {
        stream::once(async move { Ok(Bytes::from_static(data)) }).boxed()
    }

    #[tokio::test]
    async fn test_set_blob_and_commit() {
        let storage = facet().await;
        let mut tx = storage.open_tx().await.unwrap();
        let mut asset = tx.create_asset("raw").await.unwrap();
        asset.set_name("hello.txt");
        let blob = tx
            .set_blob(
                &mut asset,
                stream_of(b"hello"),
                BlobHeaders::new("hello.txt", "test"),
                &HashAlgorithm::REQUIRED,
                "text/plain",
            )
            .await
            .unwrap();
        tx.save_asset(&mut asset).await.unwrap();

        // Pending until commit
        assert!(storage
            .blob_store()
            .get(blob.blob_ref())
            .await
            .unwrap()
            .is_none());
        tx.commit().await.unwrap();

        let mut tx = storage.open_tx().await.unwrap();
        let found = tx
            .find_asset_with_property(P_NAME, "hello.txt")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.format(), "raw");
        assert_eq!(found.size(), Some(5));
        assert_eq!(found.content_type(), Some("text/plain"));
        assert_eq!(
            found.checksum(HashAlgorithm::Sha1).as_deref(),
            Some("aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d")
        );
        let blob_ref = found.blob_ref().unwrap().unwrap();
        let stored = tx.get_blob(&blob_ref).await.unwrap().unwrap();
        assert_eq!(stored.read_all().await.unwrap(), Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn test_rollback_discards_blob() {
        let storage = facet().await;
        let blob_ref = {
            let mut tx = storage.open_tx().await.unwrap();
            let mut asset = tx.create_asset("raw").await.unwrap();
            let blob = tx
                .set_blob(
                    &mut asset,
                    stream_of(b"gone"),
                    BlobHeaders::new("gone", "test"),
                    &HashAlgorithm::REQUIRED,
                    "text/plain",
                )
                .await
                .unwrap();
            blob.blob_ref().clone()
        };

        // Discarded in the background once the transaction is dropped
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let store = storage.blob_store();
        assert!(store.get(&blob_ref).await.unwrap().is_none());
        assert_eq!(
            store
                .sweep_pending(std::time::Duration::ZERO)
                .await
                .unwrap(),
            0
        );

        let mut tx = storage.open_tx().await.unwrap();
        assert!(tx
            .find_asset_with_property(P_FORMAT, "raw")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_replacing_blob_releases_old_one() {
        let storage = facet().await;
        let mut tx = storage.open_tx().await.unwrap();
        let mut asset = tx.create_asset("raw").await.unwrap();
        let first = tx
            .set_blob(
                &mut asset,
                stream_of(b"one"),
                BlobHeaders::new("a", "test"),
                &HashAlgorithm::REQUIRED,
                "text/plain",
            )
            .await
            .unwrap();
        tx.save_asset(&mut asset).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = storage.open_tx().await.unwrap();
        let second = tx
            .set_blob(
                &mut asset,
                stream_of(b"two"),
                BlobHeaders::new("a", "test"),
                &HashAlgorithm::REQUIRED,
                "text/plain",
            )
            .await
            .unwrap();
        tx.save_asset(&mut asset).await.unwrap();
        tx.commit().await.unwrap();

        let store = storage.blob_store();
        assert!(store.get(first.blob_ref()).await.unwrap().is_none());
        assert!(store.get(second.blob_ref()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_component_cascades() {
        let storage = facet().await;
        let mut tx = storage.open_tx().await.unwrap();
        let mut component = tx.create_component("raw").await.unwrap();
        component.set_name("c");
        tx.save_component(&mut component).await.unwrap();
        for name in ["a", "b"] {
            let mut asset = tx.create_asset("raw").await.unwrap();
            asset.set_name(name);
            tx.save_asset(&mut asset).await.unwrap();
            tx.attach(&asset, &component).await.unwrap();
        }
        tx.commit().await.unwrap();

        let mut tx = storage.open_tx().await.unwrap();
        let assets = tx.find_assets(&component).await.unwrap();
        assert_eq!(assets.len(), 2);
        let owner = tx.component_of(&assets[0]).await.unwrap().unwrap();
        assert_eq!(owner.id(), component.id());

        assert!(tx.delete_component(&component).await.unwrap());
        tx.commit().await.unwrap();

        let mut tx = storage.open_tx().await.unwrap();
        assert!(tx
            .find_asset_with_property(P_NAME, "a")
            .await
            .unwrap()
            .is_none());
        assert!(!tx.delete_component(&component).await.unwrap());
    }

    #[tokio::test]
    async fn test_slow_upload_does_not_hold_metadata() {
        let metadata: Arc<dyn MetadataStore> = Arc::new(MemoryMetadataStore::new());
        let blobs = BlobStore::new_ephemeral().await.unwrap();
        let uploads = StorageFacet::new("uploads", metadata.clone(), blobs.clone())
            .await
            .unwrap();
        let other = StorageFacet::new("other", metadata, blobs).await.unwrap();

        let slow = stream::once(async {
            tokio::time::sleep(std::time::Duration::from_secs(2)).await;
            Ok(Bytes::from_static(b"slow content"))
        })
        .boxed();
        let writer = uploads.clone();
        let upload = tokio::spawn(async move {
            writer
                .create_blob(
                    slow,
                    BlobHeaders::new("big.bin", "test"),
                    &HashAlgorithm::REQUIRED,
                )
                .await
        });

        // Other repositories keep working while the blob streams in
        let mut tx = tokio::time::timeout(std::time::Duration::from_millis(500), other.open_tx())
            .await
            .expect("transaction should open during an upload")
            .unwrap();
        assert!(tx
            .find_asset_with_property(P_NAME, "x.txt")
            .await
            .unwrap()
            .is_none());
        drop(tx);

        let blob = upload.await.unwrap().unwrap();
        let mut tx = uploads.open_tx().await.unwrap();
        let mut asset = tx.create_asset("raw").await.unwrap();
        asset.set_name("big.bin");
        tx.attach_blob(&mut asset, &blob, "application/octet-stream")
            .unwrap();
        tx.save_asset(&mut asset).await.unwrap();
        tx.commit().await.unwrap();

        let stored = uploads.blob_store().get(blob.blob_ref()).await.unwrap().unwrap();
        assert_eq!(stored.read_all().await.unwrap(), Bytes::from_static(b"slow content"));
    }

    #[tokio::test]
    async fn test_unadopted_blob_can_be_discarded() {
        let storage = facet().await;
        let blob = storage
            .create_blob(
                stream_of(b"orphan"),
                BlobHeaders::new("orphan", "test"),
                &HashAlgorithm::REQUIRED,
            )
            .await
            .unwrap();
        storage.discard_blob(blob.blob_ref()).await;
        assert_eq!(
            storage
                .blob_store()
                .sweep_pending(std::time::Duration::ZERO)
                .await
                .unwrap(),
            0
        );
    }
}
