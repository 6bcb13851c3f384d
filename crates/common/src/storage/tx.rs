use std::future::Future;
use std::sync::Arc;

use blob_store::{Blob, BlobHeaders, BlobRef, BlobStore, ByteStream, HashAlgorithm};
use tracing::{debug, warn};

use crate::graph::{MetadataTx, VertexClass, VertexId, EDGE_PART_OF};

use super::error::Result;
use super::node::{Asset, Component};

/// Blobs written or released by a transaction.
///
/// Created blobs stay pending until the metadata commit succeeds. If the
/// transaction is dropped first they are deleted in the background.
struct BlobChanges {
    store: BlobStore,
    created: Vec<BlobRef>,
    released: Vec<BlobRef>,
}

impl BlobChanges {
    fn release(&mut self, blob_ref: BlobRef) {
        if !self.released.contains(&blob_ref) {
            self.released.push(blob_ref);
        }
    }

    async fn discard_created(&mut self) {
        for blob_ref in self.created.drain(..) {
            if let Err(e) = self.store.delete(&blob_ref).await {
                warn!(blob = %blob_ref, error = %e, "failed to discard uncommitted blob");
            }
        }
    }
}

impl Drop for BlobChanges {
    fn drop(&mut self) {
        if self.created.is_empty() {
            return;
        }
        let created = std::mem::take(&mut self.created);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let store = self.store.clone();
                handle.spawn(async move {
                    for blob_ref in created {
                        if let Err(e) = store.delete(&blob_ref).await {
                            warn!(blob = %blob_ref, error = %e, "failed to discard rolled back blob");
                        }
                    }
                });
            }
            Err(_) => {
                warn!(
                    count = created.len(),
                    "rolled back blobs left for the pending sweep"
                );
            }
        }
    }
}

/// One unit of work on a repository's components, assets and blobs.
///
/// Nothing is visible to other transactions until [`StorageTx::commit`].
/// Dropping the transaction rolls back metadata and discards blobs it wrote.
pub struct StorageTx {
    repository: Arc<str>,
    bucket: VertexId,
    meta: Box<dyn MetadataTx>,
    blobs: BlobChanges,
}

impl StorageTx {
    pub(crate) fn new(
        repository: Arc<str>,
        bucket: VertexId,
        meta: Box<dyn MetadataTx>,
        store: BlobStore,
    ) -> Self {
        Self {
            repository,
            bucket,
            meta,
            blobs: BlobChanges {
                store,
                created: Vec::new(),
                released: Vec::new(),
            },
        }
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn bucket(&self) -> VertexId {
        self.bucket
    }

    pub async fn find_component_with_property(
        &mut self,
        key: &str,
        value: &str,
    ) -> Result<Option<Component>> {
        let found = self
            .meta
            .find_with_property(VertexClass::Component, key, value, self.bucket)
            .await?;
        Ok(found.map(Component::from_vertex))
    }

    pub async fn find_asset_with_property(
        &mut self,
        key: &str,
        value: &str,
    ) -> Result<Option<Asset>> {
        let found = self
            .meta
            .find_with_property(VertexClass::Asset, key, value, self.bucket)
            .await?;
        Ok(found.map(Asset::from_vertex))
    }

    pub async fn create_component(&mut self, format: &str) -> Result<Component> {
        let vertex = self
            .meta
            .create_vertex(VertexClass::Component, self.bucket)
            .await?;
        let mut component = Component::new(vertex, format);
        self.meta.save_vertex(component.vertex_mut()).await?;
        Ok(component)
    }

    pub async fn create_asset(&mut self, format: &str) -> Result<Asset> {
        let vertex = self
            .meta
            .create_vertex(VertexClass::Asset, self.bucket)
            .await?;
        let mut asset = Asset::new(vertex, format);
        self.meta.save_vertex(asset.vertex_mut()).await?;
        Ok(asset)
    }

    /// Make `asset` part of `component`.
    pub async fn attach(&mut self, asset: &Asset, component: &Component) -> Result<()> {
        self.meta
            .add_edge(asset.id(), EDGE_PART_OF, component.id())
            .await?;
        Ok(())
    }

    pub async fn find_assets(&mut self, component: &Component) -> Result<Vec<Asset>> {
        let assets = self.meta.in_vertices(component.id(), EDGE_PART_OF).await?;
        Ok(assets.into_iter().map(Asset::from_vertex).collect())
    }

    /// The component `asset` belongs to, if any.
    pub async fn component_of(&mut self, asset: &Asset) -> Result<Option<Component>> {
        let owners = self.meta.out_vertices(asset.id(), EDGE_PART_OF).await?;
        Ok(owners.into_iter().next().map(Component::from_vertex))
    }

    pub async fn save_component(&mut self, component: &mut Component) -> Result<()> {
        self.meta.save_vertex(component.vertex_mut()).await?;
        Ok(())
    }

    pub async fn save_asset(&mut self, asset: &mut Asset) -> Result<()> {
        self.meta.save_vertex(asset.vertex_mut()).await?;
        Ok(())
    }

    /// Stream content into a new blob and point `asset` at it.
    ///
    /// Holds the transaction open for the whole write; prefer
    /// [`super::StorageFacet::create_blob`] followed by
    /// [`StorageTx::attach_blob`] for content of unknown size.
    pub async fn set_blob(
        &mut self,
        asset: &mut Asset,
        stream: ByteStream,
        headers: BlobHeaders,
        algorithms: &[HashAlgorithm],
        content_type: &str,
    ) -> Result<Blob> {
        let blob = self.blobs.store.create(stream, headers, algorithms).await?;
        self.attach_blob(asset, &blob, content_type)?;
        Ok(blob)
    }

    /// Take over a pending blob: it is committed with this transaction or
    /// discarded when the transaction is dropped.
    pub fn adopt_blob(&mut self, blob_ref: &BlobRef) {
        if !self.blobs.created.contains(blob_ref) {
            self.blobs.created.push(blob_ref.clone());
        }
    }

    /// Point `asset` at a pending blob and adopt it.
    ///
    /// Hashes are recorded under the asset's `checksum` attributes. The
    /// asset still has to be saved; the blob it replaces is released on
    /// commit.
    pub fn attach_blob(&mut self, asset: &mut Asset, blob: &Blob, content_type: &str) -> Result<()> {
        self.adopt_blob(blob.blob_ref());

        if let Some(previous) = asset.blob_ref()? {
            self.blobs.release(previous);
        }

        let metrics = blob.metrics();
        asset.attach_blob(
            blob.blob_ref(),
            metrics.content_size,
            content_type,
            metrics.hashes.iter().map(|(a, h)| (*a, h.clone())),
        )?;
        debug!(
            repository = %self.repository,
            asset = %asset.id(),
            blob = %blob.blob_ref(),
            size = metrics.content_size,
            "blob attached"
        );
        Ok(())
    }

    /// A committed blob.
    ///
    /// The returned future does not borrow the transaction.
    pub fn get_blob(
        &self,
        blob_ref: &BlobRef,
    ) -> impl Future<Output = Result<Option<Blob>>> + Send + 'static {
        let store = self.blobs.store.clone();
        let blob_ref = blob_ref.clone();
        async move { Ok(store.get(&blob_ref).await?) }
    }

    /// Release a blob; it is deleted once the transaction commits.
    pub fn delete_blob(&mut self, blob_ref: &BlobRef) {
        self.blobs.release(blob_ref.clone());
    }

    /// Delete an asset and release its blob. Returns `false` if it was already gone.
    pub async fn delete_asset(&mut self, asset: &Asset) -> Result<bool> {
        if let Some(blob_ref) = asset.blob_ref()? {
            self.delete_blob(&blob_ref);
        }
        Ok(self.meta.delete_vertex(asset.id()).await?)
    }

    /// Delete a component together with all of its assets.
    pub async fn delete_component(&mut self, component: &Component) -> Result<bool> {
        for asset in self.find_assets(component).await? {
            self.delete_asset(&asset).await?;
        }
        Ok(self.meta.delete_vertex(component.id()).await?)
    }

    /// Persist everything done through this transaction.
    ///
    /// New blobs are committed first, then metadata. Released blobs are
    /// deleted last, so a failed commit never leaves metadata pointing at
    /// missing content.
    ///
    /// A crash between the blob and metadata commits leaves complete blobs
    /// that no asset refers to. `sweep_pending` does not collect them; they
    /// only cost space.
    pub async fn commit(self) -> Result<()> {
        let StorageTx {
            repository,
            meta,
            mut blobs,
            ..
        } = self;

        blobs.store.commit(&blobs.created).await?;

        if let Err(e) = meta.commit().await {
            warn!(repository = %repository, error = %e, "metadata commit failed");
            blobs.discard_created().await;
            return Err(e.into());
        }
        blobs.created.clear();

        for blob_ref in std::mem::take(&mut blobs.released) {
            if let Err(e) = blobs.store.delete(&blob_ref).await {
                warn!(blob = %blob_ref, error = %e, "failed to delete released blob");
            }
        }
        Ok(())
    }
}
