use std::collections::BTreeMap;

use async_trait::async_trait;
use blob_store::HashAlgorithm;

use crate::attributes::NestedAttributes;
use crate::facet::{ContentSource, FormatStrategy, PutOutcome, StorageContentFacet};
use crate::locks::ResourceLocks;
use crate::view::Payload;

use super::LocalStorageError;

/// Hash algorithms whose checksums are recorded on stored items.
const RECORDED: [HashAlgorithm; 3] = [
    HashAlgorithm::Sha1,
    HashAlgorithm::Md5,
    HashAlgorithm::Sha256,
];

/// Format attributes and checksums of a stored item.
#[derive(Debug, Clone)]
pub struct ItemAttributes {
    path: String,
    attributes: NestedAttributes,
    checksums: BTreeMap<HashAlgorithm, String>,
}

impl ItemAttributes {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn attributes(&self) -> &NestedAttributes {
        &self.attributes
    }

    /// String attribute at a dotted path, e.g. `remote.sha1`.
    pub fn get(&self, key: &str) -> Option<String> {
        self.attributes.get_path(key)
    }

    /// Digest computed locally when the content was stored.
    pub fn checksum(&self, algorithm: HashAlgorithm) -> Option<&str> {
        self.checksums.get(&algorithm).map(String::as_str)
    }
}

/// Attribute changes applied in one write. Keys are dotted paths.
#[derive(Debug, Clone, Default)]
pub struct AttributeUpdate {
    set: Vec<(String, String)>,
    remove: Vec<String>,
}

impl AttributeUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set.push((key.into(), value.into()));
        self
    }

    pub fn remove(mut self, key: impl Into<String>) -> Self {
        self.remove.push(key.into());
        self
    }

    fn apply(self, attributes: &mut NestedAttributes) -> Result<(), LocalStorageError> {
        for (key, value) in self.set {
            attributes.set_path(&key, value)?;
        }
        for key in self.remove {
            attributes.remove_path(&key);
        }
        Ok(())
    }
}

/// Item level access to a repository's local storage.
///
/// `item_attributes` and `update_item_attributes` do not lock; callers
/// hold the matching lock from [`LocalItemStorage::locks`].
/// `store_item` and `delete_item` lock for themselves.
#[async_trait]
pub trait LocalItemStorage: Send + Sync {
    fn locks(&self) -> &ResourceLocks;

    /// Store content fetched from a remote. The declared content type is
    /// replaced by the detected one when they disagree, never rejected.
    async fn store_item(
        &self,
        path: &str,
        payload: &dyn Payload,
    ) -> Result<PutOutcome, LocalStorageError>;

    async fn item_attributes(&self, path: &str) -> Result<ItemAttributes, LocalStorageError>;

    async fn update_item_attributes(
        &self,
        path: &str,
        update: AttributeUpdate,
    ) -> Result<(), LocalStorageError>;

    async fn delete_item(&self, path: &str) -> Result<(), LocalStorageError>;
}

#[async_trait]
impl<S: FormatStrategy> LocalItemStorage for StorageContentFacet<S> {
    fn locks(&self) -> &ResourceLocks {
        StorageContentFacet::locks(self)
    }

    async fn store_item(
        &self,
        path: &str,
        payload: &dyn Payload,
    ) -> Result<PutOutcome, LocalStorageError> {
        Ok(self.store(path, payload, ContentSource::Remote).await?)
    }

    async fn item_attributes(&self, path: &str) -> Result<ItemAttributes, LocalStorageError> {
        let asset = self
            .load_asset(path)
            .await?
            .ok_or_else(|| LocalStorageError::ItemNotFound(path.to_string()))?;

        let checksums = RECORDED
            .iter()
            .filter_map(|algorithm| asset.checksum(*algorithm).map(|hash| (*algorithm, hash)))
            .collect();
        Ok(ItemAttributes {
            path: asset.path().unwrap_or(path).to_string(),
            attributes: asset.format_attributes(),
            checksums,
        })
    }

    async fn update_item_attributes(
        &self,
        path: &str,
        update: AttributeUpdate,
    ) -> Result<(), LocalStorageError> {
        let updated = self
            .modify_asset(path, |asset| {
                update.apply(asset.format_attributes_mut()?)?;
                Ok(())
            })
            .await?;
        if !updated {
            return Err(LocalStorageError::ItemNotFound(path.to_string()));
        }
        Ok(())
    }

    async fn delete_item(&self, path: &str) -> Result<(), LocalStorageError> {
        let locator = self.locate(path)?;
        let _guard = StorageContentFacet::locks(self).update(&locator.path).await;
        if !self.remove_content(&locator).await? {
            return Err(LocalStorageError::ItemNotFound(path.to_string()));
        }
        Ok(())
    }
}
