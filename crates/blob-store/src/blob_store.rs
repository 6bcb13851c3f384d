//! BlobStore - streaming blob storage with SQLite metadata and object storage content.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::blob::{Blob, BlobHeaders, BlobMetrics, BlobRef, ByteStream};
use crate::database::{BlobState, Database};
use crate::error::{BlobStoreError, Result};
use crate::hashing::{HashAlgorithm, MultiHasher};
use crate::storage::{ObjectStoreConfig, Storage};

/// Name used for stores that are not given one explicitly.
pub const DEFAULT_STORE_NAME: &str = "default";

/// Blob store combining SQLite metadata with object storage.
///
/// Blobs go through a two-step lifecycle: [`BlobStore::create`] uploads the
/// content and records the blob as *pending*, [`BlobStore::commit`] makes it
/// visible to [`BlobStore::get`]. Pending blobs that are never committed are
/// reclaimed by [`BlobStore::sweep_pending`].
#[derive(Debug, Clone)]
pub struct BlobStore {
    name: Arc<str>,
    db: Database,
    storage: Storage,
}

impl BlobStore {
    /// Create a new BlobStore with a file-based SQLite database.
    pub async fn new(name: &str, db_path: &Path, config: ObjectStoreConfig) -> Result<Self> {
        let db = Database::new(db_path).await?;
        let storage = Storage::new(config).await?;
        Ok(Self::from_parts(name, db, storage))
    }

    /// Create a new BlobStore with an in-memory SQLite database.
    pub async fn in_memory(name: &str, config: ObjectStoreConfig) -> Result<Self> {
        let db = Database::in_memory().await?;
        let storage = Storage::new(config).await?;
        Ok(Self::from_parts(name, db, storage))
    }

    /// Create a new BlobStore backed by the local filesystem.
    ///
    /// The database lives at `data_dir/blobs.db`, content under `data_dir/objects/`.
    pub async fn new_local(name: &str, data_dir: &Path) -> Result<Self> {
        let db_path = data_dir.join("blobs.db");
        let config = ObjectStoreConfig::Local {
            path: data_dir.join("objects"),
        };
        Self::new(name, &db_path, config).await
    }

    /// Create a fully ephemeral BlobStore (in-memory DB + in-memory object storage).
    pub async fn new_ephemeral() -> Result<Self> {
        Self::in_memory(DEFAULT_STORE_NAME, ObjectStoreConfig::Memory).await
    }

    fn from_parts(name: &str, db: Database, storage: Storage) -> Self {
        Self {
            name: Arc::from(name),
            db,
            storage,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn blob_id<'a>(&self, blob_ref: &'a BlobRef) -> Result<&'a str> {
        if blob_ref.store() != &*self.name {
            return Err(BlobStoreError::ForeignBlobRef(
                blob_ref.to_string(),
                self.name.to_string(),
            ));
        }
        Ok(blob_ref.blob_id())
    }

    /// Stream content into a new pending blob, computing `algorithms` on the way.
    pub async fn create(
        &self,
        stream: ByteStream,
        headers: BlobHeaders,
        algorithms: &[HashAlgorithm],
    ) -> Result<Blob> {
        let blob_id = uuid::Uuid::new_v4().to_string();
        let blob_ref = BlobRef::new(&*self.name, &blob_id);
        self.db.insert_pending(&blob_id, &headers).await?;

        let mut hasher = MultiHasher::new(algorithms);
        let size = match self.storage.put_stream(&blob_id, stream, &mut hasher).await {
            Ok(size) => size,
            Err(e) => {
                warn!(blob = %blob_ref, error = %e, "blob upload failed");
                if let Err(cleanup) = self.db.delete_blob(&blob_id).await {
                    warn!(blob = %blob_ref, error = %cleanup, "failed to drop record of failed upload");
                }
                return Err(e);
            }
        };
        let hashes = hasher.finish();
        self.db.record_upload(&blob_id, size, &hashes).await?;

        debug!(blob = %blob_ref, name = %headers.name, size = size, "pending blob written");
        let metrics = BlobMetrics {
            created: Utc::now(),
            content_size: size,
            hashes,
        };
        Ok(Blob::new(blob_ref, headers, metrics, self.storage.clone()))
    }

    /// Make pending blobs readable.
    pub async fn commit(&self, blob_refs: &[BlobRef]) -> Result<()> {
        if blob_refs.is_empty() {
            return Ok(());
        }
        let ids = blob_refs
            .iter()
            .map(|r| self.blob_id(r))
            .collect::<Result<Vec<_>>>()?;
        let committed = self.db.mark_complete(&ids).await?;
        if committed as usize != ids.len() {
            warn!(
                expected = ids.len(),
                committed = committed,
                "some blobs were not pending at commit"
            );
        }
        debug!(count = committed, "blobs committed");
        Ok(())
    }

    /// Look up a committed blob.
    pub async fn get(&self, blob_ref: &BlobRef) -> Result<Option<Blob>> {
        let blob_id = self.blob_id(blob_ref)?;
        let Some(record) = self.db.get_blob(blob_id).await? else {
            return Ok(None);
        };
        if record.state != BlobState::Complete {
            return Ok(None);
        }
        Ok(Some(Blob::new(
            blob_ref.clone(),
            record.headers,
            record.metrics,
            self.storage.clone(),
        )))
    }

    /// Delete a blob in any state. Deleting an absent blob returns `false`.
    pub async fn delete(&self, blob_ref: &BlobRef) -> Result<bool> {
        let blob_id = self.blob_id(blob_ref)?;
        if self.db.get_blob(blob_id).await?.is_none() {
            return Ok(false);
        }

        self.db.set_state(blob_id, BlobState::Deleting).await?;
        self.storage.delete(blob_id).await?;
        self.db.delete_blob(blob_id).await?;

        info!(blob = %blob_ref, "blob deleted");
        Ok(true)
    }

    /// Delete blobs that stayed pending (or half-deleted) for longer than `older_than`.
    ///
    /// Returns the number of blobs removed.
    pub async fn sweep_pending(&self, older_than: Duration) -> Result<usize> {
        let max_age = chrono::Duration::from_std(older_than)
            .map_err(|e| BlobStoreError::InvalidConfig(e.to_string()))?;
        let cutoff = Utc::now() - max_age;

        let mut swept = 0;
        for blob_id in self.db.abandoned_before(cutoff).await? {
            let blob_ref = BlobRef::new(&*self.name, &blob_id);
            match self.delete(&blob_ref).await {
                Ok(true) => swept += 1,
                Ok(false) => {}
                Err(e) => warn!(blob = %blob_ref, error = %e, "failed to sweep abandoned blob"),
            }
        }

        if swept > 0 {
            info!(count = swept, "swept abandoned blobs");
        }
        Ok(swept)
    }
}

#[cfg(test)]
impl BlobStore {
    async fn pending_count(&self) -> Result<i64> {
        self.db.count_blobs(BlobState::Pending).await
    }
}
