use std::collections::HashSet;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use blob_store::ObjectStoreConfig;
use common::facet::maven::VersionPolicy;
use common::proxy::ChecksumPolicy;
use serde::{Deserialize, Serialize};
use url::Url;

pub const METADATA_DB_FILE_NAME: &str = "metadata.db";
pub const BLOBS_DB_FILE_NAME: &str = "blobs.db";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Address for the HTTP server to listen on
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    /// Default log level, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Directory holding the metadata and blob databases
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Where blob content is kept
    #[serde(default)]
    pub blob_store: ObjectStoreConfig,
    #[serde(default = "default_remote_timeout_secs")]
    pub remote_timeout_secs: u64,
    /// Pending blobs older than this are swept at start-up
    #[serde(default = "default_pending_blob_max_age_secs")]
    pub pending_blob_max_age_secs: u64,
    #[serde(default)]
    pub repositories: Vec<RepositoryConfig>,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)), 8081)
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_remote_timeout_secs() -> u64 {
    60
}

fn default_pending_blob_max_age_secs() -> u64 {
    60 * 60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            log_level: default_log_level(),
            data_dir: default_data_dir(),
            blob_store: ObjectStoreConfig::default(),
            remote_timeout_secs: default_remote_timeout_secs(),
            pending_blob_max_age_secs: default_pending_blob_max_age_secs(),
            repositories: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn metadata_db_path(&self) -> PathBuf {
        self.data_dir.join(METADATA_DB_FILE_NAME)
    }

    pub fn blobs_db_path(&self) -> PathBuf {
        self.data_dir.join(BLOBS_DB_FILE_NAME)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }

    pub fn pending_blob_max_age(&self) -> Duration {
        Duration::from_secs(self.pending_blob_max_age_secs)
    }

    pub fn repository(&self, name: &str) -> Option<&RepositoryConfig> {
        self.repositories.iter().find(|r| r.name == name)
    }

    /// Names are unique, proxies have a remote, and group members are
    /// existing non-group repositories of the group's format.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for repository in &self.repositories {
            if repository.name.is_empty() || repository.name.contains('/') {
                return Err(ConfigError::InvalidName(repository.name.clone()));
            }
            if !names.insert(repository.name.as_str()) {
                return Err(ConfigError::DuplicateRepository(repository.name.clone()));
            }
        }

        for repository in &self.repositories {
            match repository.kind {
                RepositoryKind::Proxy if repository.remote_url.is_none() => {
                    return Err(ConfigError::MissingRemoteUrl(repository.name.clone()))
                }
                RepositoryKind::Group => {
                    for member in &repository.members {
                        let Some(target) = self.repository(member) else {
                            return Err(ConfigError::UnknownMember {
                                group: repository.name.clone(),
                                member: member.clone(),
                            });
                        };
                        if target.kind == RepositoryKind::Group || target.format != repository.format
                        {
                            return Err(ConfigError::InvalidMember {
                                group: repository.name.clone(),
                                member: member.clone(),
                            });
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RepositoryFormat {
    #[serde(rename = "maven2")]
    Maven2,
    #[serde(rename = "raw")]
    Raw,
    #[serde(rename = "simple")]
    Simple,
}

impl fmt::Display for RepositoryFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RepositoryFormat::Maven2 => "maven2",
            RepositoryFormat::Raw => "raw",
            RepositoryFormat::Simple => "simple",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryKind {
    #[default]
    Hosted,
    Proxy,
    Group,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub name: String,
    pub format: RepositoryFormat,
    #[serde(default)]
    pub kind: RepositoryKind,
    #[serde(default = "default_true")]
    pub strict_content_type_validation: bool,
    /// Maven only
    #[serde(default)]
    pub version_policy: VersionPolicy,
    /// Maven proxies only; absent disables validation
    #[serde(default)]
    pub checksum_policy: Option<ChecksumPolicy>,
    /// Proxies only
    #[serde(default)]
    pub remote_url: Option<Url>,
    #[serde(default = "default_not_found_cache_ttl_secs")]
    pub not_found_cache_ttl_secs: u64,
    /// Proxies only; absent means cached content never expires
    #[serde(default)]
    pub content_max_age_secs: Option<u64>,
    /// Groups only, in lookup order
    #[serde(default)]
    pub members: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_not_found_cache_ttl_secs() -> u64 {
    24 * 60 * 60
}

impl RepositoryConfig {
    pub fn not_found_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.not_found_cache_ttl_secs)
    }

    pub fn content_max_age(&self) -> Option<Duration> {
        self.content_max_age_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
    #[error("invalid repository name '{0}'")]
    InvalidName(String),
    #[error("repository '{0}' is configured more than once")]
    DuplicateRepository(String),
    #[error("proxy repository '{0}' has no remote_url")]
    MissingRemoteUrl(String),
    #[error("group '{group}' refers to unknown repository '{member}'")]
    UnknownMember { group: String, member: String },
    #[error("group '{group}' cannot contain '{member}'")]
    InvalidMember { group: String, member: String },
}
