//! Repository service for the depot gateway.
//!
//! This crate wires the storage core in `common` into a running service:
//! - Configuration (TOML file with the repositories to serve)
//! - State management (metadata store, blob store and assembled repositories)
//! - Repositories (hosted, proxy and group request handling)
//! - HTTP handlers (repository routes and health checks)

pub mod config;
pub mod http;
pub mod repository;
pub mod state;

// Re-export key types for convenience
pub use config::{Config, ConfigError, RepositoryConfig, RepositoryFormat, RepositoryKind};
pub use repository::Repository;
pub use state::{State as ServiceState, StateSetupError};
