use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use url::Url;

use crate::facet::{normalize_path, ContentFacet, FacetError, PutOutcome, Result};
use crate::view::{Content, Payload};

use super::{
    ChecksumContentValidator, ChecksumPolicy, LocalItemStorage, NotFoundCache, RemoteStorage,
};

/// Local storage a proxy caches into.
pub trait LocalRepository: ContentFacet + LocalItemStorage {}

impl<T: ContentFacet + LocalItemStorage + ?Sized> LocalRepository for T {}

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub remote_url: Url,
    /// `None` disables checksum validation
    pub checksum_policy: Option<ChecksumPolicy>,
    /// Cached content older than this is re-fetched; `None` never expires
    pub content_max_age: Option<Duration>,
    pub not_found_cache_ttl: Duration,
}

/// Read-through cache of a remote repository.
///
/// Fresh local content is served as is. Anything else is fetched from the
/// remote, stored locally, checksum validated and then served. Remote
/// misses go to the not-found cache; when the remote fails, stale local
/// content is served.
#[derive(Debug)]
pub struct ProxyFacet {
    local: Arc<dyn LocalRepository>,
    remote: Arc<dyn RemoteStorage>,
    remote_url: Url,
    checksum_policy: Option<ChecksumPolicy>,
    content_max_age: Option<chrono::Duration>,
    not_found_cache: NotFoundCache,
    validator: ChecksumContentValidator,
}

impl ProxyFacet {
    pub fn new(
        local: Arc<dyn LocalRepository>,
        remote: Arc<dyn RemoteStorage>,
        config: ProxyConfig,
    ) -> Self {
        let not_found_cache = NotFoundCache::new(config.not_found_cache_ttl);
        let validator = ChecksumContentValidator::new(remote.clone(), not_found_cache.clone());
        Self {
            local,
            remote,
            remote_url: config.remote_url,
            checksum_policy: config.checksum_policy,
            content_max_age: config
                .content_max_age
                .and_then(|age| chrono::Duration::from_std(age).ok()),
            not_found_cache,
            validator,
        }
    }

    pub fn remote_url(&self) -> &Url {
        &self.remote_url
    }

    pub fn not_found_cache(&self) -> &NotFoundCache {
        &self.not_found_cache
    }

    fn is_stale(&self, content: &Content) -> bool {
        let Some(max_age) = self.content_max_age else {
            return false;
        };
        match content.last_verified() {
            Some(verified) => verified + max_age < Utc::now(),
            None => true,
        }
    }

    async fn fetch(&self, path: &str, stale: Option<Content>) -> Result<Option<Content>> {
        let as_expired = stale.is_some();
        let payload = match self.remote.retrieve(&self.remote_url, path).await {
            Ok(payload) => payload,
            Err(e) => {
                if e.is_not_found() {
                    debug!(path = path, "not found on remote");
                    self.not_found_cache.insert(path);
                } else {
                    warn!(path = path, error = %e, "remote fetch failed");
                }
                return Ok(stale);
            }
        };

        self.local.store_item(path, &payload).await?;
        self.local.set_last_verified(path, Utc::now()).await?;

        let outcome = self
            .validator
            .validate(
                self.checksum_policy,
                self.local.as_ref(),
                path,
                as_expired,
                &self.remote_url,
            )
            .await?;
        if !outcome.is_valid() {
            info!(path = path, outcome = ?outcome, "discarding invalid remote content");
            self.local.delete(path).await?;
            return Ok(None);
        }

        self.not_found_cache.remove(path);
        self.local.get(path).await
    }
}

#[async_trait]
impl ContentFacet for ProxyFacet {
    fn format(&self) -> &str {
        self.local.format()
    }

    async fn get(&self, path: &str) -> Result<Option<Content>> {
        let path = normalize_path(path)?;
        let cached = self.local.get(&path).await?;

        match cached {
            Some(content) if !self.is_stale(&content) => Ok(Some(content)),
            Some(stale) => {
                debug!(path = %path, "cached content is stale, re-fetching");
                self.fetch(&path, Some(stale)).await
            }
            None if self.not_found_cache.contains(&path) => {
                debug!(path = %path, "not found cache hit");
                Ok(None)
            }
            None => self.fetch(&path, None).await,
        }
    }

    async fn put(&self, path: &str, _payload: &dyn Payload) -> Result<PutOutcome> {
        Err(FacetError::Unsupported(format!(
            "cannot deploy {} to a proxy repository",
            path
        )))
    }

    async fn delete(&self, path: &str) -> Result<bool> {
        let deleted = self.local.delete(path).await?;
        self.not_found_cache.remove(&normalize_path(path)?);
        Ok(deleted)
    }

    async fn last_verified(&self, path: &str) -> Result<Option<DateTime<Utc>>> {
        self.local.last_verified(path).await
    }

    async fn set_last_verified(&self, path: &str, verified: DateTime<Utc>) -> Result<bool> {
        self.local.set_last_verified(path, verified).await
    }
}
