//! Tokio I/O Adapters
//!
//! Bridges any `AsyncRead` / `AsyncWrite` (files, sockets, duplex pipes)
//! onto the lane ports.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::warn;

use crate::domain::ports::{ByteSink, ByteSource};
use crate::error::{Error, Result};

/// Lane source over an `AsyncRead`.
#[derive(Debug)]
pub struct ReaderSource<R> {
    inner: R,
}

impl<R> ReaderSource<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> ByteSource for ReaderSource<R> {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.inner.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }
}

/// Lane sink over an `AsyncWrite`.
///
/// `AsyncWrite` has no error channel, so `abort` only shuts the writer
/// down; the terminal error is logged.
#[derive(Debug)]
pub struct WriterSink<W> {
    inner: W,
    closed: bool,
}

impl<W> WriterSink<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            closed: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> ByteSink for WriterSink<W> {
    async fn write(&mut self, data: Bytes) -> Result<()> {
        if self.closed {
            return Err(Error::Downstream {
                lane: None,
                reason: "write after close".to_string(),
            });
        }
        self.inner.write_all(&data).await?;
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.inner.flush().await?;
        self.inner.shutdown().await?;
        Ok(())
    }

    async fn abort(&mut self, error: &Error) {
        if self.closed {
            return;
        }
        self.closed = true;
        warn!("Closing writer after pipeline error: {}", error);
        if let Err(e) = self.inner.shutdown().await {
            warn!("Writer shutdown failed: {}", e);
        }
    }
}
