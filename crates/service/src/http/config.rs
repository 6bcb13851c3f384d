use std::net::SocketAddr;

/// HTTP server settings derived from the service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    // level for http response tracing
    pub log_level: tracing::Level,
    pub max_upload_size: usize,
}

impl Config {
    pub fn new(listen_addr: SocketAddr, log_level: tracing::Level) -> Self {
        tracing::info!(
            "Creating HTTP server Config: listen_addr={}, log_level={}",
            listen_addr,
            log_level
        );
        Self {
            listen_addr,
            log_level,
            max_upload_size: super::MAX_UPLOAD_SIZE_BYTES,
        }
    }

    /// Unparseable levels fall back to `INFO`.
    pub fn from_service(config: &crate::Config) -> Self {
        let log_level = config.log_level.parse().unwrap_or(tracing::Level::INFO);
        Self::new(config.listen_addr, log_level)
    }
}
