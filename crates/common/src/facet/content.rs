use async_trait::async_trait;
use blob_store::{Blob, BlobHeaders, HashAlgorithm};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::graph::P_ATTRIBUTES;
use crate::locks::ResourceLocks;
use crate::storage::{Asset, StorageError, StorageFacet, StorageTx};
use crate::view::{Content, Payload};

use super::mime::essence;
use super::{
    normalize_path, ComponentLocator, ContentFacet, FacetConfig, FacetError, FormatStrategy,
    Locator, MimeSupport, PutOutcome, Result, TempSpool, A_CONTENT_LAST_MODIFIED, A_KEY,
    A_LAST_VERIFIED, CREATED_BY_UNKNOWN,
};

/// Where stored content comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ContentSource {
    /// Written by a client; the declared type is trusted or rejected.
    Upload,
    /// Fetched from a remote repository; the detected type wins.
    Remote,
}

/// Content facet over a [`StorageFacet`], parameterized by format.
///
/// Public operations take the per-path lock (update for writes, read for
/// reads) before opening a transaction. The `pub(crate)` helpers do not
/// lock; callers hold the lock themselves.
#[derive(Debug)]
pub struct StorageContentFacet<S> {
    storage: StorageFacet,
    strategy: S,
    config: FacetConfig,
    mime: MimeSupport,
    locks: ResourceLocks,
    key_property: String,
}

impl<S: FormatStrategy> StorageContentFacet<S> {
    pub fn new(storage: StorageFacet, strategy: S, config: FacetConfig) -> Self {
        let key_property = format!("{}.{}.{}", P_ATTRIBUTES, strategy.format(), A_KEY);
        storage.ensure_unique_component_key(&key_property);
        storage.ensure_unique_asset_key(&key_property);

        Self {
            storage,
            strategy,
            config,
            mime: MimeSupport,
            locks: ResourceLocks::new(),
            key_property,
        }
    }

    pub fn storage(&self) -> &StorageFacet {
        &self.storage
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    pub fn locks(&self) -> &ResourceLocks {
        &self.locks
    }

    /// Indexed property holding component and asset keys, e.g. `attributes.maven2.key`.
    pub fn key_property(&self) -> &str {
        &self.key_property
    }

    pub(crate) fn locate(&self, path: &str) -> Result<Locator> {
        let path = normalize_path(path)?;
        self.strategy.locate(&path)
    }

    async fn find_asset(&self, tx: &mut StorageTx, locator: &Locator) -> Result<Option<Asset>> {
        Ok(tx
            .find_asset_with_property(&self.key_property, &locator.path)
            .await?)
    }

    /// Declared type if it holds up, otherwise the detected one.
    ///
    /// Uploads are checked against `strict_content_type_validation`.
    /// Fetched content is never rejected: a contradicted declaration is
    /// replaced by the detected type.
    fn determine_content_type(
        &self,
        path: &str,
        spool: &TempSpool,
        source: ContentSource,
    ) -> Result<String> {
        let strict =
            source == ContentSource::Upload && self.config.strict_content_type_validation;

        let Some(declared) = spool.content_type() else {
            debug!(path = path, "no declared content type");
            return match self.mime.detect_mime_type(spool.head(), path) {
                Some(detected) => Ok(detected),
                None if strict => Err(FacetError::InvalidContent(
                    "Content type could not be determined.".to_string(),
                )),
                None => {
                    warn!(path = path, "content type could not be determined");
                    Ok(mime::APPLICATION_OCTET_STREAM.to_string())
                }
            };
        };

        let detected = self.mime.detect_mime_types(spool.head(), path);
        let declared_essence = essence(declared);
        if !detected.is_empty() && !detected.iter().any(|t| *t == declared_essence) {
            if strict {
                return Err(FacetError::InvalidContent(format!(
                    "Declared content type {}, but detected {}.",
                    declared, detected[0]
                )));
            }
            warn!(
                path = path,
                declared = declared,
                detected = %detected[0],
                "declared content type contradicts content"
            );
            if source == ContentSource::Remote {
                return Ok(detected[0].clone());
            }
        }
        Ok(declared.to_string())
    }

    pub(crate) async fn read_content(&self, locator: &Locator) -> Result<Option<Content>> {
        let mut tx = self.storage.open_tx().await?;
        let Some(asset) = self.find_asset(&mut tx, locator).await? else {
            return Ok(None);
        };
        drop(tx);
        let Some(blob_ref) = asset.blob_ref()? else {
            return Ok(None);
        };
        let blob = self
            .storage
            .blob_store()
            .get(&blob_ref)
            .await
            .map_err(StorageError::from)?
            .ok_or_else(|| {
                StorageError::InvalidRecord(format!(
                    "asset at {} refers to missing blob {}",
                    locator.path, blob_ref
                ))
            })?;

        let attributes = asset.format_attributes();
        Ok(Some(Content::new(
            blob,
            asset
                .content_type()
                .unwrap_or(mime::APPLICATION_OCTET_STREAM.as_ref()),
            attributes.get::<DateTime<Utc>>(A_CONTENT_LAST_MODIFIED)?,
            attributes.get::<DateTime<Utc>>(A_LAST_VERIFIED)?,
        )))
    }

    async fn create_component(
        &self,
        tx: &mut StorageTx,
        locator: &ComponentLocator,
    ) -> Result<crate::storage::Component> {
        let mut component = tx.create_component(self.strategy.format()).await?;
        component.set_group(locator.group.as_deref());
        component.set_name(&locator.name);
        component.set_version(locator.version.as_deref());

        let attributes = component.format_attributes_mut()?;
        attributes.merge(locator.attributes.clone());
        attributes.set(A_KEY, &locator.key)?;
        tx.save_component(&mut component).await?;
        debug!(key = %locator.key, "component created");
        Ok(component)
    }

    async fn create_asset(&self, tx: &mut StorageTx, locator: &Locator) -> Result<Asset> {
        let mut asset = tx.create_asset(self.strategy.format()).await?;
        asset.set_name(&locator.asset_name);
        asset.set_path(&locator.path);

        let attributes = asset.format_attributes_mut()?;
        attributes.merge(locator.asset_attributes.clone());
        attributes.set(A_KEY, &locator.path)?;

        if let Some(component_locator) = &locator.component {
            let existing = tx
                .find_component_with_property(&self.key_property, &component_locator.key)
                .await?;
            let component = match existing {
                Some(component) => component,
                None => self.create_component(tx, component_locator).await?,
            };
            tx.attach(&asset, &component).await?;
        }
        Ok(asset)
    }

    /// Attach an already written blob to the asset at `locator` in one
    /// short transaction. The blob is discarded if that fails.
    async fn write_content(
        &self,
        locator: &Locator,
        blob: Blob,
        content_type: &str,
    ) -> Result<PutOutcome> {
        let mut tx = match self.storage.open_tx().await {
            Ok(tx) => tx,
            Err(e) => {
                self.storage.discard_blob(blob.blob_ref()).await;
                return Err(e.into());
            }
        };
        tx.adopt_blob(blob.blob_ref());

        let (mut asset, outcome) = match self.find_asset(&mut tx, locator).await? {
            Some(asset) => (asset, PutOutcome::Updated),
            None => (
                self.create_asset(&mut tx, locator).await?,
                PutOutcome::Created,
            ),
        };

        tx.attach_blob(&mut asset, &blob, content_type)?;
        asset
            .format_attributes_mut()?
            .set(A_CONTENT_LAST_MODIFIED, Utc::now())?;
        tx.save_asset(&mut asset).await?;
        tx.commit().await?;

        info!(
            repository = self.storage.repository(),
            path = %locator.path,
            content_type = content_type,
            size = blob.metrics().content_size,
            outcome = ?outcome,
            "content stored"
        );
        Ok(outcome)
    }

    /// Spool, type and write `payload` into a pending blob, then attach it
    /// under the path's update lock.
    pub(crate) async fn store(
        &self,
        path: &str,
        payload: &dyn Payload,
        source: ContentSource,
    ) -> Result<PutOutcome> {
        let locator = self.locate(path)?;
        self.strategy.check_put(&locator)?;

        // Spool and upload before locking; the source may be slow
        let spool = TempSpool::spool(payload).await?;
        let content_type = self.determine_content_type(&locator.path, &spool, source)?;
        let blob = self
            .storage
            .create_blob(
                spool.open().await?,
                BlobHeaders::new(&locator.path, CREATED_BY_UNKNOWN),
                &HashAlgorithm::REQUIRED,
            )
            .await?;

        let _guard = self.locks.update(&locator.path).await;
        self.write_content(&locator, blob, &content_type).await
    }

    pub(crate) async fn remove_content(&self, locator: &Locator) -> Result<bool> {
        let mut tx = self.storage.open_tx().await?;
        let Some(asset) = self.find_asset(&mut tx, locator).await? else {
            return Ok(false);
        };

        let component = tx.component_of(&asset).await?;
        tx.delete_asset(&asset).await?;
        if let Some(component) = component {
            if tx.find_assets(&component).await?.is_empty() {
                tx.delete_component(&component).await?;
                debug!(path = %locator.path, "last asset removed, component deleted");
            }
        }
        tx.commit().await?;

        info!(
            repository = self.storage.repository(),
            path = %locator.path,
            "content deleted"
        );
        Ok(true)
    }

    /// Load the asset at `path` without locking.
    pub(crate) async fn load_asset(&self, path: &str) -> Result<Option<Asset>> {
        let locator = self.locate(path)?;
        let mut tx = self.storage.open_tx().await?;
        self.find_asset(&mut tx, &locator).await
    }

    /// Apply `update` to the asset at `path` and save it, without locking.
    pub(crate) async fn modify_asset<F>(&self, path: &str, update: F) -> Result<bool>
    where
        F: FnOnce(&mut Asset) -> Result<()> + Send,
    {
        let locator = self.locate(path)?;
        let mut tx = self.storage.open_tx().await?;
        let Some(mut asset) = self.find_asset(&mut tx, &locator).await? else {
            return Ok(false);
        };
        update(&mut asset)?;
        tx.save_asset(&mut asset).await?;
        tx.commit().await?;
        Ok(true)
    }
}

#[async_trait]
impl<S: FormatStrategy> ContentFacet for StorageContentFacet<S> {
    fn format(&self) -> &str {
        self.strategy.format()
    }

    async fn get(&self, path: &str) -> Result<Option<Content>> {
        let locator = self.locate(path)?;
        let _guard = self.locks.read(&locator.path).await;
        self.read_content(&locator).await
    }

    async fn put(&self, path: &str, payload: &dyn Payload) -> Result<PutOutcome> {
        self.store(path, payload, ContentSource::Upload).await
    }

    async fn delete(&self, path: &str) -> Result<bool> {
        let locator = self.locate(path)?;
        let _guard = self.locks.update(&locator.path).await;
        self.remove_content(&locator).await
    }

    async fn last_verified(&self, path: &str) -> Result<Option<DateTime<Utc>>> {
        let locator = self.locate(path)?;
        let _guard = self.locks.read(&locator.path).await;
        match self.load_asset(path).await? {
            Some(asset) => Ok(asset.format_attributes().get(A_LAST_VERIFIED)?),
            None => Ok(None),
        }
    }

    async fn set_last_verified(&self, path: &str, verified: DateTime<Utc>) -> Result<bool> {
        let locator = self.locate(path)?;
        let _guard = self.locks.update(&locator.path).await;
        self.modify_asset(path, |asset| {
            asset
                .format_attributes_mut()?
                .set(A_LAST_VERIFIED, verified)?;
            Ok(())
        })
        .await
    }
}
