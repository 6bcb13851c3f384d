use std::sync::Arc;

use blob_store::HashAlgorithm;
use http::StatusCode;
use tracing::debug;

use crate::facet::{ContentFacet, FacetError, Result};
use crate::view::{BytesPayload, Content, Payload, Response};

use super::{MavenFacet, MavenPath};

/// Metadata cache of a Maven group repository.
///
/// Member responses for a metadata file are reduced to one document which
/// is stored, together with its checksum files, in the group's own storage.
#[derive(Debug, Clone)]
pub struct MavenGroupFacet {
    cache: Arc<MavenFacet>,
}

impl MavenGroupFacet {
    pub fn new(cache: Arc<MavenFacet>) -> Self {
        Self { cache }
    }

    pub async fn cached_merged_metadata(&self, path: &str) -> Result<Option<Content>> {
        self.cache.get(path).await
    }

    /// Reduce member responses (in member order) to one cached document.
    ///
    /// Returns `None` when no member answered with content.
    pub async fn merge_and_cache_metadata(
        &self,
        path: &str,
        responses: Vec<(String, Response)>,
    ) -> Result<Option<Content>> {
        let maven_path = MavenPath::parse(path);
        if maven_path.is_hash() {
            return Err(FacetError::Rejected(format!(
                "only metadata can be merged and cached, not {}",
                path
            )));
        }

        // TODO: merge the metadata documents of all members instead of taking the first
        let merged = responses.into_iter().find_map(|(member, mut response)| {
            if response.status() != StatusCode::OK {
                return None;
            }
            response.take_payload().map(|payload| (member, payload))
        });
        let Some((member, payload)) = merged else {
            return Ok(None);
        };
        debug!(path = path, member = %member, "caching group metadata");

        self.cache_merged_metadata(&maven_path, payload.as_ref())
            .await?;
        self.cached_merged_metadata(path).await
    }

    async fn cache_merged_metadata(&self, path: &MavenPath, payload: &dyn Payload) -> Result<()> {
        self.cache.put(path.path(), payload).await?;
        let Some(content) = self.cache.get(path.path()).await? else {
            return Ok(());
        };
        for algorithm in HashAlgorithm::REQUIRED {
            if let Some(digest) = content.hash(algorithm) {
                let checksum = BytesPayload::new(digest.to_string(), Some("text/plain"));
                self.cache
                    .put(path.hash(algorithm).path(), &checksum)
                    .await?;
            }
        }
        Ok(())
    }
}
