use std::io;

use async_trait::async_trait;
use blob_store::ByteStream;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, StreamExt, TryStreamExt};
use tempfile::NamedTempFile;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::view::Payload;

use super::mime::SNIFF_LEN;

const READ_CHUNK: usize = 64 * 1024;

/// A payload spilled to a temporary file so it can be read more than once.
///
/// The file is removed when the spool is dropped.
#[derive(Debug)]
pub struct TempSpool {
    file: NamedTempFile,
    size: u64,
    head: Bytes,
    content_type: Option<String>,
}

impl TempSpool {
    /// Copy `payload` to disk, keeping its first bytes in memory for sniffing.
    pub async fn spool(payload: &dyn Payload) -> io::Result<Self> {
        let file = tokio::task::spawn_blocking(NamedTempFile::new)
            .await
            .map_err(io::Error::other)??;
        let mut out = tokio::fs::File::from_std(file.reopen()?);

        let mut head = BytesMut::new();
        let mut size = 0u64;
        let mut input = payload.open().await?;
        while let Some(chunk) = input.try_next().await? {
            if head.len() < SNIFF_LEN {
                let take = (SNIFF_LEN - head.len()).min(chunk.len());
                head.extend_from_slice(&chunk[..take]);
            }
            out.write_all(&chunk).await?;
            size += chunk.len() as u64;
        }
        out.flush().await?;

        Ok(Self {
            file,
            size,
            head: head.freeze(),
            content_type: payload.content_type().map(str::to_string),
        })
    }

    pub fn head(&self) -> &[u8] {
        &self.head
    }

    pub fn len(&self) -> u64 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

#[async_trait]
impl Payload for TempSpool {
    fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    fn size(&self) -> Option<u64> {
        Some(self.size)
    }

    async fn open(&self) -> io::Result<ByteStream> {
        let file = tokio::fs::File::open(self.file.path()).await?;
        let chunks = stream::try_unfold(file, |mut file| async move {
            let mut buf = BytesMut::zeroed(READ_CHUNK);
            let n = file.read(&mut buf).await?;
            if n == 0 {
                return Ok::<_, io::Error>(None);
            }
            buf.truncate(n);
            Ok(Some((buf.freeze(), file)))
        });
        Ok(chunks.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::{read_all, BytesPayload};

    #[tokio::test]
    async fn test_spool_replays() {
        let data = vec![7u8; SNIFF_LEN * 3 + 11];
        let payload = BytesPayload::new(data.clone(), Some("application/octet-stream"));
        let spool = TempSpool::spool(&payload).await.unwrap();

        assert_eq!(spool.len(), data.len() as u64);
        assert_eq!(spool.head().len(), SNIFF_LEN);
        assert_eq!(spool.content_type(), Some("application/octet-stream"));
        for _ in 0..2 {
            assert_eq!(read_all(&spool).await.unwrap(), Bytes::from(data.clone()));
        }
    }

    #[tokio::test]
    async fn test_spool_empty() {
        let spool = TempSpool::spool(&BytesPayload::new(Bytes::new(), None))
            .await
            .unwrap();
        assert!(spool.is_empty());
        assert!(spool.head().is_empty());
        assert!(read_all(&spool).await.unwrap().is_empty());
    }
}
