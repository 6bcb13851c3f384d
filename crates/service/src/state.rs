use std::collections::BTreeMap;
use std::sync::Arc;

use blob_store::{BlobStore, BlobStoreError, DEFAULT_STORE_NAME};
use common::facet::maven::{MavenFacet, MavenGroupFacet, MavenStrategy, VersionPolicy};
use common::facet::raw::{RawFacet, RawStrategy};
use common::facet::simple::{SimpleFacet, SimpleStrategy};
use common::facet::{ContentFacet, FacetConfig};
use common::graph::{GraphError, MetadataStore, SqliteMetadataStore};
use common::proxy::{
    HttpRemoteStorage, LocalRepository, ProxyConfig, ProxyFacet, RemoteStorage,
    RemoteStorageError,
};
use common::storage::{StorageError, StorageFacet};

use super::config::{Config, RepositoryConfig, RepositoryFormat, RepositoryKind};
use super::repository::{Backend, Member, Repository};

/// Main service state: the stores and every configured repository
#[derive(Clone)]
pub struct State {
    metadata: Arc<dyn MetadataStore>,
    blobs: BlobStore,
    repositories: Arc<BTreeMap<String, Arc<Repository>>>,
}

impl State {
    pub async fn from_config(config: &Config) -> Result<Self, StateSetupError> {
        // 1. Setup data directory and metadata database
        tokio::fs::create_dir_all(&config.data_dir).await?;
        let metadata_path = config.metadata_db_path();
        tracing::info!(path = %metadata_path.display(), "opening metadata store");
        let metadata: Arc<dyn MetadataStore> =
            Arc::new(SqliteMetadataStore::new(&metadata_path).await?);

        // 2. Setup blob store and reclaim blobs of interrupted writes
        let blobs = BlobStore::new(
            DEFAULT_STORE_NAME,
            &config.blobs_db_path(),
            config.blob_store.clone(),
        )
        .await?;
        let swept = blobs.sweep_pending(config.pending_blob_max_age()).await?;
        if swept > 0 {
            tracing::info!(swept = swept, "swept abandoned pending blobs");
        }

        // 3. Remote client shared by all proxies
        let remote: Arc<dyn RemoteStorage> =
            Arc::new(HttpRemoteStorage::new(config.remote_timeout())?);

        Self::assemble(config, metadata, blobs, remote).await
    }

    /// Build the configured repositories over existing stores.
    pub async fn assemble(
        config: &Config,
        metadata: Arc<dyn MetadataStore>,
        blobs: BlobStore,
        remote: Arc<dyn RemoteStorage>,
    ) -> Result<Self, StateSetupError> {
        let mut repositories = BTreeMap::new();

        // Groups refer to the others, so build them last
        let (groups, others): (Vec<_>, Vec<_>) = config
            .repositories
            .iter()
            .partition(|r| r.kind == RepositoryKind::Group);

        for repository in others {
            let (content, local) = local_storage(repository, &metadata, &blobs).await?;
            let backend = match repository.kind {
                RepositoryKind::Proxy => {
                    let remote_url = repository
                        .remote_url
                        .clone()
                        .ok_or_else(|| StateSetupError::MissingRemoteUrl(repository.name.clone()))?;
                    let checksum_policy = match repository.format {
                        RepositoryFormat::Maven2 => repository.checksum_policy,
                        _ => None,
                    };
                    Backend::Content(Arc::new(ProxyFacet::new(
                        local,
                        remote.clone(),
                        ProxyConfig {
                            remote_url,
                            checksum_policy,
                            content_max_age: repository.content_max_age(),
                            not_found_cache_ttl: repository.not_found_cache_ttl(),
                        },
                    )))
                }
                _ => Backend::Content(content),
            };
            tracing::info!(
                repository = %repository.name,
                format = %repository.format,
                kind = ?repository.kind,
                "repository ready"
            );
            repositories.insert(
                repository.name.clone(),
                Arc::new(Repository::new(
                    &repository.name,
                    repository.format,
                    repository.kind,
                    backend,
                )),
            );
        }

        for group in groups {
            let mut members = Vec::with_capacity(group.members.len());
            for name in &group.members {
                let facet = repositories
                    .get(name)
                    .and_then(|r: &Arc<Repository>| r.content_facet())
                    .ok_or_else(|| StateSetupError::MissingMember {
                        group: group.name.clone(),
                        member: name.clone(),
                    })?;
                members.push(Member {
                    name: name.clone(),
                    facet,
                });
            }

            let metadata_cache = match group.format {
                RepositoryFormat::Maven2 => {
                    let storage =
                        StorageFacet::new(&group.name, metadata.clone(), blobs.clone()).await?;
                    let cache = MavenFacet::new(
                        storage,
                        MavenStrategy::new(VersionPolicy::Mixed),
                        FacetConfig {
                            strict_content_type_validation: false,
                        },
                    );
                    Some(MavenGroupFacet::new(Arc::new(cache)))
                }
                _ => None,
            };

            tracing::info!(
                repository = %group.name,
                format = %group.format,
                members = ?group.members,
                "group ready"
            );
            repositories.insert(
                group.name.clone(),
                Arc::new(Repository::new(
                    &group.name,
                    group.format,
                    RepositoryKind::Group,
                    Backend::Group {
                        members,
                        metadata: metadata_cache,
                    },
                )),
            );
        }

        Ok(Self {
            metadata,
            blobs,
            repositories: Arc::new(repositories),
        })
    }

    pub fn repository(&self, name: &str) -> Option<&Arc<Repository>> {
        self.repositories.get(name)
    }

    pub fn repositories(&self) -> impl Iterator<Item = &Arc<Repository>> {
        self.repositories.values()
    }

    pub fn metadata(&self) -> &Arc<dyn MetadataStore> {
        &self.metadata
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }
}

/// Storage for a hosted repository or the local side of a proxy.
async fn local_storage(
    repository: &RepositoryConfig,
    metadata: &Arc<dyn MetadataStore>,
    blobs: &BlobStore,
) -> Result<(Arc<dyn ContentFacet>, Arc<dyn LocalRepository>), StateSetupError> {
    let storage = StorageFacet::new(&repository.name, metadata.clone(), blobs.clone()).await?;
    let config = FacetConfig {
        strict_content_type_validation: repository.strict_content_type_validation,
    };
    Ok(match repository.format {
        RepositoryFormat::Maven2 => both(MavenFacet::new(
            storage,
            MavenStrategy::new(repository.version_policy),
            config,
        )),
        RepositoryFormat::Raw => both(RawFacet::new(storage, RawStrategy, config)),
        RepositoryFormat::Simple => both(SimpleFacet::new(storage, SimpleStrategy, config)),
    })
}

fn both<F: LocalRepository + 'static>(
    facet: F,
) -> (Arc<dyn ContentFacet>, Arc<dyn LocalRepository>) {
    let facet = Arc::new(facet);
    (facet.clone(), facet)
}

#[derive(Debug, thiserror::Error)]
pub enum StateSetupError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("metadata store error: {0}")]
    Metadata(#[from] GraphError),
    #[error("blob store error: {0}")]
    BlobStore(#[from] BlobStoreError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("remote storage error: {0}")]
    Remote(#[from] RemoteStorageError),
    #[error("proxy repository '{0}' has no remote_url")]
    MissingRemoteUrl(String),
    #[error("group '{group}' member '{member}' is not a hosted or proxy repository")]
    MissingMember { group: String, member: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::view::{read_all, BytesPayload, Request};
    use http::StatusCode;

    fn config(dir: &std::path::Path) -> Config {
        let toml = format!(
            r#"
data_dir = "{data}"

[blob_store]
type = "local"
path = "{blobs}"

[[repositories]]
name = "files"
format = "raw"

[[repositories]]
name = "central"
format = "maven2"
kind = "proxy"
remote_url = "https://repo.example.org/maven2/"
checksum_policy = "strict"

[[repositories]]
name = "all"
format = "raw"
kind = "group"
members = ["files"]
"#,
            data = dir.join("data").display(),
            blobs = dir.join("blobs").display(),
        );
        Config::from_toml(&toml).unwrap()
    }

    #[tokio::test]
    async fn test_from_config_builds_repositories() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let state = State::from_config(&config).await.unwrap();

        let names: Vec<_> = state.repositories().map(|r| r.name().to_string()).collect();
        assert_eq!(names, vec!["all", "central", "files"]);
        assert_eq!(
            state.repository("central").unwrap().kind(),
            RepositoryKind::Proxy
        );
        assert!(state.repository("all").unwrap().content_facet().is_none());
        assert!(config.metadata_db_path().exists());
    }

    #[tokio::test]
    async fn test_content_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());

        {
            let state = State::from_config(&config).await.unwrap();
            let files = state.repository("files").unwrap();
            let put = Request::put("a/b.txt", BytesPayload::new("kept", Some("text/plain")));
            assert_eq!(files.handle(&put).await.status(), StatusCode::CREATED);
        }

        let state = State::from_config(&config).await.unwrap();
        let response = state
            .repository("all")
            .unwrap()
            .handle(&Request::get("a/b.txt"))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_all(response.payload().unwrap()).await.unwrap();
        assert_eq!(body.as_ref(), b"kept");
    }
}
