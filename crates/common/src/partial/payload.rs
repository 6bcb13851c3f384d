use std::io;

use async_trait::async_trait;
use blob_store::ByteStream;
use futures::stream::{self, StreamExt, TryStreamExt};

use crate::view::Payload;

/// Window `[lower, upper]` of another payload, read lazily.
#[derive(Debug)]
pub struct PartialPayload {
    inner: Box<dyn Payload>,
    lower: u64,
    upper: u64,
}

struct Window {
    stream: ByteStream,
    skip: u64,
    remaining: u64,
}

impl PartialPayload {
    pub fn new(inner: Box<dyn Payload>, lower: u64, upper: u64) -> Self {
        Self {
            inner,
            lower,
            upper,
        }
    }

    fn window_len(&self) -> u64 {
        self.upper - self.lower + 1
    }
}

#[async_trait]
impl Payload for PartialPayload {
    fn content_type(&self) -> Option<&str> {
        self.inner.content_type()
    }

    fn size(&self) -> Option<u64> {
        Some(self.window_len())
    }

    async fn open(&self) -> io::Result<ByteStream> {
        let window = Window {
            stream: self.inner.open().await?,
            skip: self.lower,
            remaining: self.window_len(),
        };

        Ok(stream::try_unfold(window, |mut window| async move {
            while window.remaining > 0 {
                let Some(mut chunk) = window.stream.try_next().await? else {
                    break;
                };
                let len = chunk.len() as u64;
                if window.skip >= len {
                    window.skip -= len;
                    continue;
                }
                if window.skip > 0 {
                    chunk = chunk.slice(window.skip as usize..);
                    window.skip = 0;
                }
                if chunk.len() as u64 > window.remaining {
                    chunk.truncate(window.remaining as usize);
                }
                window.remaining -= chunk.len() as u64;
                return Ok(Some((chunk, window)));
            }
            Ok::<_, io::Error>(None)
        })
        .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    use crate::view::read_all;

    /// Payload delivered in fixed size chunks.
    #[derive(Debug)]
    struct Chunked {
        bytes: Bytes,
        chunk: usize,
    }

    #[async_trait]
    impl Payload for Chunked {
        fn content_type(&self) -> Option<&str> {
            Some("application/octet-stream")
        }

        fn size(&self) -> Option<u64> {
            Some(self.bytes.len() as u64)
        }

        async fn open(&self) -> io::Result<ByteStream> {
            let chunks: Vec<io::Result<Bytes>> = self
                .bytes
                .chunks(self.chunk)
                .map(|c| Ok(Bytes::copy_from_slice(c)))
                .collect();
            Ok(stream::iter(chunks).boxed())
        }
    }

    #[tokio::test]
    async fn test_window_across_chunks() {
        let bytes: Bytes = (0u8..100).collect::<Vec<_>>().into();
        for chunk in [1, 3, 7, 64, 200] {
            let inner = Box::new(Chunked {
                bytes: bytes.clone(),
                chunk,
            });
            let partial = PartialPayload::new(inner, 10, 42);
            assert_eq!(partial.size(), Some(33));
            assert_eq!(
                partial.content_type(),
                Some("application/octet-stream")
            );
            let read = read_all(&partial).await.unwrap();
            assert_eq!(read, bytes.slice(10..=42), "chunk size {}", chunk);
        }
    }

    #[tokio::test]
    async fn test_reopen_reads_again() {
        let inner = Box::new(crate::view::BytesPayload::new("0123456789", None));
        let partial = PartialPayload::new(inner, 8, 9);
        assert_eq!(read_all(&partial).await.unwrap().as_ref(), b"89");
        assert_eq!(read_all(&partial).await.unwrap().as_ref(), b"89");
    }
}
