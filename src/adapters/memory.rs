//! In-Memory Lanes
//!
//! In-process channel endpoints, used to chain operations together (encode
//! straight into decode) and to observe exactly what each lane received.
//!
//! - [`pipe`] - bounded channel with backpressure, end-of-stream and error
//! - [`MemorySource`] - fixed bytes with read counting and failure injection
//! - [`MemorySink`] - records data, end-of-stream and error deliveries

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::domain::ports::{ByteSink, ByteSource};
use crate::error::{Error, Result};

// =============================================================================
// Pipe
// =============================================================================

#[derive(Debug)]
enum PipeMessage {
    Data(Bytes),
    Failed(String),
}

/// Create a bounded pipe holding at most `capacity` in-flight pieces.
///
/// Writes on the sink wait while the pipe is full; dropping or finishing
/// the sink ends the stream; aborting it delivers the error to the reader.
pub fn pipe(capacity: usize) -> (PipeSink, PipeSource) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        PipeSink { tx: Some(tx) },
        PipeSource {
            rx,
            pending: Bytes::new(),
            failure: None,
        },
    )
}

/// Writable end of a [`pipe`].
#[derive(Debug)]
pub struct PipeSink {
    tx: Option<mpsc::Sender<PipeMessage>>,
}

#[async_trait]
impl ByteSink for PipeSink {
    async fn write(&mut self, data: Bytes) -> Result<()> {
        let tx = self.tx.as_ref().ok_or_else(|| Error::Downstream {
            lane: None,
            reason: "pipe already closed".to_string(),
        })?;
        tx.send(PipeMessage::Data(data))
            .await
            .map_err(|_| Error::Downstream {
                lane: None,
                reason: "pipe reader dropped".to_string(),
            })
    }

    async fn finish(&mut self) -> Result<()> {
        self.tx.take();
        Ok(())
    }

    async fn abort(&mut self, error: &Error) {
        if let Some(tx) = self.tx.take() {
            // the reader may already be gone
            let _ = tx.send(PipeMessage::Failed(error.to_string())).await;
        }
    }
}

/// Readable end of a [`pipe`].
#[derive(Debug)]
pub struct PipeSource {
    rx: mpsc::Receiver<PipeMessage>,
    pending: Bytes,
    failure: Option<String>,
}

#[async_trait]
impl ByteSource for PipeSource {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            if !self.pending.is_empty() {
                let n = self.pending.len().min(buf.len() - filled);
                buf[filled..filled + n].copy_from_slice(&self.pending.split_to(n));
                filled += n;
                continue;
            }
            if let Some(reason) = &self.failure {
                return Err(Error::Upstream {
                    lane: None,
                    reason: reason.clone(),
                });
            }
            match self.rx.recv().await {
                Some(PipeMessage::Data(data)) => self.pending = data,
                Some(PipeMessage::Failed(reason)) => self.failure = Some(reason),
                None => break,
            }
        }
        Ok(filled)
    }
}

// =============================================================================
// Memory Source
// =============================================================================

/// Source serving a fixed byte string.
#[derive(Debug)]
pub struct MemorySource {
    data: Bytes,
    fail_at: Option<(usize, String)>,
    reads: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl MemorySource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            fail_at: None,
            reads: Arc::new(AtomicUsize::new(0)),
            delay: None,
        }
    }

    /// Fail with `reason` on the first read that would cross `offset`.
    pub fn fail_after(mut self, offset: usize, reason: impl Into<String>) -> Self {
        self.fail_at = Some((offset, reason.into()));
        self
    }

    /// Sleep before serving each read, to model a slow producer.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Shared counter of `read` calls made on this source.
    pub fn read_counter(&self) -> Arc<AtomicUsize> {
        self.reads.clone()
    }
}

#[async_trait]
impl ByteSource for MemorySource {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        } else {
            tokio::task::yield_now().await;
        }

        let want = buf.len().min(self.data.len());
        if let Some((offset, reason)) = &mut self.fail_at {
            if *offset < want || (*offset == 0 && !buf.is_empty()) {
                return Err(Error::Upstream {
                    lane: None,
                    reason: reason.clone(),
                });
            }
            *offset -= want;
        }

        buf[..want].copy_from_slice(&self.data.split_to(want));
        Ok(want)
    }
}

// =============================================================================
// Memory Sink
// =============================================================================

/// Everything a [`MemorySink`] has observed.
#[derive(Debug, Default)]
pub struct SinkRecord {
    pub data: BytesMut,
    pub writes: usize,
    pub finished: usize,
    pub errors: Vec<String>,
}

/// Sink recording what it receives. Clones share one record.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    record: Arc<Mutex<SinkRecord>>,
    delay: Option<Duration>,
    fail_writes: Option<String>,
    finish_delay: Option<Duration>,
    fail_finish: Option<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep inside every write, to model a slow consumer.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Reject every write with `reason`.
    pub fn failing(mut self, reason: impl Into<String>) -> Self {
        self.fail_writes = Some(reason.into());
        self
    }

    /// Sleep inside `finish` before recording it.
    pub fn with_finish_delay(mut self, delay: Duration) -> Self {
        self.finish_delay = Some(delay);
        self
    }

    /// Reject end-of-stream with `reason`.
    pub fn failing_finish(mut self, reason: impl Into<String>) -> Self {
        self.fail_finish = Some(reason.into());
        self
    }

    /// Bytes received so far
    pub fn contents(&self) -> Bytes {
        Bytes::copy_from_slice(&self.record.lock().data)
    }

    /// Number of end-of-stream signals received
    pub fn finish_count(&self) -> usize {
        self.record.lock().finished
    }

    /// Whether end-of-stream was received
    pub fn is_finished(&self) -> bool {
        self.finish_count() > 0
    }

    /// Error signals received, in order
    pub fn errors(&self) -> Vec<String> {
        self.record.lock().errors.clone()
    }

    /// Number of write calls accepted
    pub fn write_count(&self) -> usize {
        self.record.lock().writes
    }
}

#[async_trait]
impl ByteSink for MemorySink {
    async fn write(&mut self, data: Bytes) -> Result<()> {
        if let Some(reason) = &self.fail_writes {
            return Err(Error::Downstream {
                lane: None,
                reason: reason.clone(),
            });
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut record = self.record.lock();
        record.data.extend_from_slice(&data);
        record.writes += 1;
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        if let Some(delay) = self.finish_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = &self.fail_finish {
            return Err(Error::Downstream {
                lane: None,
                reason: reason.clone(),
            });
        }
        self.record.lock().finished += 1;
        Ok(())
    }

    async fn abort(&mut self, error: &Error) {
        self.record.lock().errors.push(error.to_string());
    }
}
