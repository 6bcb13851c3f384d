//! Validation of proxied content against the remote's checksum files.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use blob_store::HashAlgorithm;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::facet::is_checksum_path;
use crate::view::read_all;

use super::{
    AttributeUpdate, LocalItemStorage, LocalStorageError, NotFoundCache, RemoteStorage,
    RemoteStorageError,
};

/// Remote hashes are tried in this order.
const PREFERRED: [HashAlgorithm; 2] = [HashAlgorithm::Sha1, HashAlgorithm::Md5];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecksumPolicy {
    /// No validation
    Ignore,
    /// Mismatches are logged, content is kept
    #[default]
    Warn,
    /// Mismatches reject content; a missing remote hash does not
    StrictIfExists,
    /// Mismatches and missing remote hashes reject content
    Strict,
}

impl ChecksumPolicy {
    pub fn should_check(&self) -> bool {
        !matches!(self, ChecksumPolicy::Ignore)
    }
}

impl fmt::Display for ChecksumPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChecksumPolicy::Ignore => "ignore",
            ChecksumPolicy::Warn => "warn",
            ChecksumPolicy::StrictIfExists => "strict_if_exists",
            ChecksumPolicy::Strict => "strict",
        })
    }
}

impl FromStr for ChecksumPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "ignore" => Ok(ChecksumPolicy::Ignore),
            "warn" => Ok(ChecksumPolicy::Warn),
            "strict_if_exists" => Ok(ChecksumPolicy::StrictIfExists),
            "strict" => Ok(ChecksumPolicy::Strict),
            other => Err(format!("unknown checksum policy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// Nothing to validate: a checksum file, or the policy does not check
    Skipped,
    /// The remote has neither a `.sha1` nor a `.md5` for the item
    NoRemoteHash { accepted: bool },
    Verified { algorithm: HashAlgorithm },
    Mismatch {
        algorithm: HashAlgorithm,
        expected: String,
        actual: Option<String>,
        accepted: bool,
    },
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        match self {
            ValidationOutcome::Skipped | ValidationOutcome::Verified { .. } => true,
            ValidationOutcome::NoRemoteHash { accepted }
            | ValidationOutcome::Mismatch { accepted, .. } => *accepted,
        }
    }
}

/// Hash published by the remote next to an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteHash {
    pub algorithm: HashAlgorithm,
    pub hash: String,
    /// Path of the checksum file, e.g. `a/b.jar.sha1`
    pub hash_path: String,
}

fn remote_attribute(algorithm: HashAlgorithm) -> String {
    format!("remote.{}", algorithm.name())
}

fn legacy_missing_attribute(algorithm: HashAlgorithm) -> String {
    format!("remote.no-{}", algorithm.name())
}

/// Digest from a checksum file body.
///
/// Accepts a bare digest, `digest  filename` and the BSD
/// `ALG (filename) = digest` form.
pub fn parse_digest(body: &str) -> Option<String> {
    let line = body.lines().map(str::trim).find(|l| !l.is_empty())?;
    let token = match line.rsplit_once(" = ") {
        Some((_, digest)) => digest.trim(),
        None => line.split_whitespace().next()?,
    };
    if token.is_empty() || !token.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(token.to_ascii_lowercase())
}

/// Fetches, caches and compares remote checksums for proxied items.
///
/// Attribute reads happen under the item's read lock and attribute writes
/// under its update lock; neither is held while the remote is contacted.
#[derive(Debug, Clone)]
pub struct ChecksumContentValidator {
    remote: Arc<dyn RemoteStorage>,
    not_found_cache: NotFoundCache,
}

impl ChecksumContentValidator {
    pub fn new(remote: Arc<dyn RemoteStorage>, not_found_cache: NotFoundCache) -> Self {
        Self {
            remote,
            not_found_cache,
        }
    }

    /// Validate the stored item at `path` against `base_url`.
    ///
    /// `as_expired` bypasses the cached remote hash and the not-found cache.
    /// Invalid outcomes delete the local copy of the remote checksum file.
    pub async fn validate<L>(
        &self,
        policy: Option<ChecksumPolicy>,
        local: &L,
        path: &str,
        as_expired: bool,
        base_url: &Url,
    ) -> Result<ValidationOutcome, LocalStorageError>
    where
        L: LocalItemStorage + ?Sized,
    {
        let Some(policy) = policy.filter(|p| p.should_check()) else {
            return Ok(ValidationOutcome::Skipped);
        };
        if is_checksum_path(path) {
            return Ok(ValidationOutcome::Skipped);
        }

        let remote_hash = self
            .retrieve_remote_hash(local, path, as_expired, base_url)
            .await?;

        let outcome = match &remote_hash {
            None => {
                let accepted = policy != ChecksumPolicy::Strict;
                if !accepted {
                    info!(path = path, "item has no remote checksum, rejecting");
                }
                ValidationOutcome::NoRemoteHash { accepted }
            }
            Some(remote) => {
                let actual = {
                    let _guard = local.locks().read(path).await;
                    local
                        .item_attributes(path)
                        .await?
                        .checksum(remote.algorithm)
                        .map(str::to_string)
                };
                if actual.as_deref() == Some(remote.hash.as_str()) {
                    ValidationOutcome::Verified {
                        algorithm: remote.algorithm,
                    }
                } else {
                    let accepted = policy == ChecksumPolicy::Warn;
                    warn!(
                        path = path,
                        algorithm = %remote.algorithm,
                        expected = %remote.hash,
                        actual = actual.as_deref().unwrap_or("none"),
                        accepted = accepted,
                        "checksum mismatch"
                    );
                    ValidationOutcome::Mismatch {
                        algorithm: remote.algorithm,
                        expected: remote.hash.clone(),
                        actual,
                        accepted,
                    }
                }
            }
        };

        if !outcome.is_valid() {
            if let Some(remote) = &remote_hash {
                self.cleanup(local, &remote.hash_path).await?;
            }
        }
        Ok(outcome)
    }

    /// SHA-1 if the remote has it, MD5 otherwise.
    pub async fn retrieve_remote_hash<L>(
        &self,
        local: &L,
        path: &str,
        as_expired: bool,
        base_url: &Url,
    ) -> Result<Option<RemoteHash>, LocalStorageError>
    where
        L: LocalItemStorage + ?Sized,
    {
        for algorithm in PREFERRED {
            if let Some(hash) = self
                .retrieve_hash(local, path, algorithm, as_expired, base_url)
                .await?
            {
                return Ok(Some(RemoteHash {
                    algorithm,
                    hash,
                    hash_path: format!("{}{}", path, algorithm.extension()),
                }));
            }
        }
        debug!(path = path, "item checksums (SHA1, MD5) remotely unavailable");
        Ok(None)
    }

    async fn retrieve_hash<L>(
        &self,
        local: &L,
        path: &str,
        algorithm: HashAlgorithm,
        as_expired: bool,
        base_url: &Url,
    ) -> Result<Option<String>, LocalStorageError>
    where
        L: LocalItemStorage + ?Sized,
    {
        let hash_path = format!("{}{}", path, algorithm.extension());
        let attribute = remote_attribute(algorithm);

        let cached = {
            let _guard = local.locks().read(path).await;
            let attributes = local.item_attributes(path).await?;
            if self.not_found_cache.contains(&hash_path) && !as_expired {
                return Ok(None);
            }
            attributes.get(&attribute)
        };
        if cached.is_some() && !as_expired {
            return Ok(cached);
        }

        match self.fetch_hash(&hash_path, base_url).await {
            Ok(hash) => {
                let _guard = local.locks().update(path).await;
                local
                    .update_item_attributes(
                        path,
                        AttributeUpdate::new()
                            .set(attribute, hash.clone())
                            .remove(legacy_missing_attribute(algorithm)),
                    )
                    .await?;
                Ok(Some(hash))
            }
            Err(e) => {
                debug!(path = %hash_path, error = %e, "remote checksum unavailable");
                self.not_found_cache.insert(&hash_path);
                Ok(cached)
            }
        }
    }

    async fn fetch_hash(&self, hash_path: &str, base_url: &Url) -> Result<String, RemoteStorageError> {
        let payload = self.remote.retrieve(base_url, hash_path).await?;
        let body = read_all(&payload).await?;
        parse_digest(&String::from_utf8_lossy(&body)).ok_or_else(|| {
            RemoteStorageError::Body(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("no digest in {}", hash_path),
            ))
        })
    }

    async fn cleanup<L>(&self, local: &L, hash_path: &str) -> Result<(), LocalStorageError>
    where
        L: LocalItemStorage + ?Sized,
    {
        match local.delete_item(hash_path).await {
            Ok(()) => {
                debug!(path = hash_path, "deleted checksum of invalid item");
                Ok(())
            }
            Err(LocalStorageError::ItemNotFound(_)) | Err(LocalStorageError::Unsupported(_)) => {
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
