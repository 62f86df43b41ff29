use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::cache::{CacheKey, PageCache};
use crate::domain::CacheEntry;

/// Tee over a caller's output that records every byte the caller received.
///
/// Only a completed write is cached: call [`finish`](Self::finish) after the
/// last byte. A writer that saw any I/O error, or that is dropped without
/// `finish`, stores nothing.
pub struct CaptureWriter<'a, W: ?Sized> {
    cache: &'a PageCache,
    inner: &'a mut W,
    buffer: Vec<u8>,
    failed: bool,
    template: CacheEntry,
    key: CacheKey,
    persist: bool,
}

impl<'a, W> CaptureWriter<'a, W>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    pub(crate) fn new(
        cache: &'a PageCache,
        inner: &'a mut W,
        template: CacheEntry,
        key: CacheKey,
        persist: bool,
    ) -> Self {
        Self {
            cache,
            inner,
            buffer: Vec::new(),
            failed: false,
            template,
            key,
            persist,
        }
    }

    /// Bytes captured so far.
    pub fn captured(&self) -> &[u8] {
        &self.buffer
    }

    /// Flush the underlying output and, if nothing failed, store the capture.
    /// Returns whether an entry was stored.
    pub async fn finish(mut self) -> io::Result<bool> {
        if let Err(e) = self.inner.flush().await {
            self.failed = true;
            warn!("Output flush failed, not caching {}: {}", self.key, e);
            return Err(e);
        }

        if self.failed {
            warn!("Output write failed earlier, not caching {}", self.key);
            return Ok(false);
        }

        let entry = CacheEntry {
            content: std::mem::take(&mut self.buffer),
            ..self.template.clone()
        };
        debug!("Caching {} bytes under {}", entry.content.len(), self.key);
        self.cache.store(&self.key, entry, self.persist);
        Ok(true)
    }
}

impl<W> AsyncWrite for CaptureWriter<'_, W>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = &mut *self;
        match Pin::new(&mut *this.inner).poll_write(cx, buf) {
            Poll::Ready(Ok(n)) => {
                this.buffer.extend_from_slice(&buf[..n]);
                Poll::Ready(Ok(n))
            }
            Poll::Ready(Err(e)) => {
                this.failed = true;
                Poll::Ready(Err(e))
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = &mut *self;
        let poll = Pin::new(&mut *this.inner).poll_flush(cx);
        if let Poll::Ready(Err(_)) = poll {
            this.failed = true;
        }
        poll
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = &mut *self;
        let poll = Pin::new(&mut *this.inner).poll_shutdown(cx);
        if let Poll::Ready(Err(_)) = poll {
            this.failed = true;
        }
        poll
    }
}
