//! Byte streams moved between callers and providers.

use bytes::{Bytes, BytesMut};
use futures::{stream, Stream, StreamExt};
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use omnistore_common::Result;

/// Upper bound on the buffer reserved up front from a declared size.
const PREALLOC_LIMIT: u64 = 8 * 1024 * 1024;

/// Byte stream type for upload/download operations.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// A lazy, finite, single-pass download.
///
/// Carries what the backend declared about the content. The stream cannot be
/// restarted; dropping it releases the underlying response.
pub struct DownloadStream {
    inner: ByteStream,
    size: Option<u64>,
    name: Option<String>,
    content_type: Option<String>,
}

impl DownloadStream {
    pub fn new(inner: ByteStream) -> Self {
        Self {
            inner,
            size: None,
            name: None,
            content_type: None,
        }
    }

    /// Wrap an in-memory buffer; the size is known exactly.
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        let data: Bytes = data.into();
        let size = data.len() as u64;
        Self::new(Box::pin(stream::once(async move { Ok(data) }))).with_size(Some(size))
    }

    pub fn with_size(mut self, size: Option<u64>) -> Self {
        self.size = size;
        self
    }

    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    pub fn with_content_type(mut self, content_type: Option<String>) -> Self {
        self.content_type = content_type;
        self
    }

    /// Declared size in bytes, if the backend reported one.
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn into_inner(self) -> ByteStream {
        self.inner
    }

    /// Drain the stream into one buffer.
    ///
    /// The declared size only seeds the buffer up to `PREALLOC_LIMIT`; the
    /// chunks actually received decide the final length.
    pub async fn collect_bytes(mut self) -> Result<Bytes> {
        let hint = self.size.unwrap_or(0).min(PREALLOC_LIMIT) as usize;
        let mut buffer = BytesMut::with_capacity(hint);
        while let Some(chunk) = self.inner.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        Ok(buffer.freeze())
    }
}

impl Stream for DownloadStream {
    type Item = Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl fmt::Debug for DownloadStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadStream")
            .field("size", &self.size)
            .field("name", &self.name)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_collects_chunks_in_order() {
        let chunks: Vec<Result<Bytes>> = vec![Ok(Bytes::from_static(b"ab")), Ok(Bytes::from_static(b"cd"))];
        let download = DownloadStream::new(Box::pin(stream::iter(chunks))).with_name(Some("x".into()));
        assert_eq!(download.name(), Some("x"));
        assert_eq!(download.collect_bytes().await.unwrap(), Bytes::from_static(b"abcd"));
    }

    #[tokio::test]
    async fn test_from_bytes_declares_size() {
        let download = DownloadStream::from_bytes(vec![1u8, 2, 3]);
        assert_eq!(download.size(), Some(3));
        assert_eq!(download.collect_bytes().await.unwrap().as_ref(), &[1, 2, 3]);
    }

    #[tokio::test]
    async fn test_oversized_declared_size_is_not_trusted() {
        let download = DownloadStream::from_bytes(&b"tiny"[..]).with_size(Some(1 << 46));
        assert_eq!(download.collect_bytes().await.unwrap().as_ref(), b"tiny");
    }
}
