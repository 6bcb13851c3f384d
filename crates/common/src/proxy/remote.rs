use std::fmt;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{StreamExt, TryStreamExt};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use tracing::debug;
use url::Url;

use crate::view::StreamPayload;

use super::RemoteStorageError;

/// Read access to an upstream repository.
#[async_trait]
pub trait RemoteStorage: Send + Sync + fmt::Debug {
    async fn retrieve(&self, base_url: &Url, path: &str)
        -> Result<StreamPayload, RemoteStorageError>;
}

/// `base_url` joined with a repository path, keeping the base's last segment.
pub fn resolve(base_url: &Url, path: &str) -> Result<Url, RemoteStorageError> {
    let mut base = base_url.clone();
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    Ok(base.join(path.trim_start_matches('/'))?)
}

#[derive(Debug, Clone)]
pub struct HttpRemoteStorage {
    client: Client,
}

impl HttpRemoteStorage {
    pub fn new(timeout: Duration) -> Result<Self, RemoteStorageError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("depot/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RemoteStorage for HttpRemoteStorage {
    async fn retrieve(
        &self,
        base_url: &Url,
        path: &str,
    ) -> Result<StreamPayload, RemoteStorageError> {
        let url = resolve(base_url, path)?;
        debug!(url = %url, "remote retrieve");

        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            if e.is_timeout() {
                RemoteStorageError::Timeout(url.to_string())
            } else {
                RemoteStorageError::Transport(e)
            }
        })?;

        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                return Err(RemoteStorageError::NotFound(url.to_string()))
            }
            status if !status.is_success() => {
                return Err(RemoteStorageError::Status {
                    status,
                    url: url.to_string(),
                })
            }
            _ => {}
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let size = response.content_length();
        let stream = response.bytes_stream().map_err(io::Error::other).boxed();
        Ok(StreamPayload::new(content_type, size, stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_keeps_base_path() {
        let base = Url::parse("https://repo.example.org/maven2").unwrap();
        assert_eq!(
            resolve(&base, "/org/example/a.jar").unwrap().as_str(),
            "https://repo.example.org/maven2/org/example/a.jar"
        );
        let base = Url::parse("https://repo.example.org/maven2/").unwrap();
        assert_eq!(
            resolve(&base, "a.jar").unwrap().as_str(),
            "https://repo.example.org/maven2/a.jar"
        );
    }
}
