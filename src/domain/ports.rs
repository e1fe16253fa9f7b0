//! Domain Ports (Port/Adapter Pattern)
//!
//! The pipelines only ever talk to the outside world through the traits in
//! this module. Transport adapters implement [`ByteSource`] and
//! [`ByteSink`]; Galois-field arithmetic sits behind [`StripeCoder`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Pipelines (ec::*)                         │
//! │   encode        decode        repair        OperationContext │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Ports (Traits)                        │
//! │          ByteSource │ ByteSink │ StripeCoder                 │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Adapters (Impls)                         │
//! │  ReaderSource/WriterSink │ pipe/MemorySink │ ReedSolomonCoder│
//! └─────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use bytes::Bytes;

use crate::ec::LaneSet;
use crate::error::{Error, Result};

// =============================================================================
// Channel Ports
// =============================================================================

/// Readable end of a lane.
///
/// A source lane feeding the coder is never read ahead: the pipeline decides
/// when to read and how much, so a slow stripe naturally pauses its
/// producer.
/// Awaiting [`ByteSource::read`] is the readiness signal; a pending read is
/// resumed by the runtime when more bytes arrive.
#[async_trait]
pub trait ByteSource: Send {
    /// Read up to `buf.len()` bytes.
    ///
    /// Returns fewer than `buf.len()` bytes only when the stream has ended.
    /// A return of `0` for a non-empty buffer means end of stream.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize>;
}

/// Writable end of a lane.
#[async_trait]
pub trait ByteSink: Send {
    /// Write one piece. Completes once the sink has accepted the bytes,
    /// which may be deferred while the consumer applies backpressure.
    async fn write(&mut self, data: Bytes) -> Result<()>;

    /// Signal end of stream. Called at most once.
    async fn finish(&mut self) -> Result<()>;

    /// Signal a terminal error. Called at most once, never after `finish`.
    async fn abort(&mut self, error: &Error);
}

/// Boxed readable lane
pub type BoxSource = Box<dyn ByteSource>;

/// Boxed writable lane
pub type BoxSink = Box<dyn ByteSink>;

#[async_trait]
impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf).await
    }
}

#[async_trait]
impl<S: ByteSink + ?Sized> ByteSink for Box<S> {
    async fn write(&mut self, data: Bytes) -> Result<()> {
        (**self).write(data).await
    }

    async fn finish(&mut self) -> Result<()> {
        (**self).finish().await
    }

    async fn abort(&mut self, error: &Error) {
        (**self).abort(error).await
    }
}

// =============================================================================
// Coding Primitive Port
// =============================================================================

/// Galois-field coding step for one stripe.
///
/// `data` holds the k data slices and `parity` the m parity slices, each
/// `shard_len` bytes, laid out by in-half lane index. The coder reads the
/// lanes in `sources` (exactly k of them), leaves them untouched and
/// overwrites every lane in `targets`. Lanes in neither set may be
/// overwritten with their true bytes as well. Implementations must be
/// reentrant: one instance serves concurrent, unrelated operations.
pub trait StripeCoder: Send + Sync {
    /// Number of data shards (k)
    fn data_shards(&self) -> usize;

    /// Number of parity shards (m)
    fn parity_shards(&self) -> usize;

    /// Compute `targets` from `sources`.
    fn code(
        &self,
        sources: LaneSet,
        targets: LaneSet,
        data: &mut [u8],
        parity: &mut [u8],
        shard_len: usize,
    ) -> Result<()>;
}
