//! Infrastructure Adapters
//!
//! Implementations of the domain ports, following the Port/Adapter
//! (Hexagonal) architecture pattern.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Domain Layer                              │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │                    Ports (Traits)                           │ │
//! │  │          ByteSource │ ByteSink │ StripeCoder                │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Adapters (This Module)                       │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │ ReedSolomonCoder │ XorCoder │ ReaderSource │ WriterSink    │ │
//! │  │ pipe (PipeSink/PipeSource) │ MemorySource │ MemorySink      │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use stripeflow::adapters::{pipe, ReaderSource, WriterSink};
//!
//! // Wire a Tokio stream to an encode input
//! let input = ReaderSource::new(tokio::fs::File::open("object.bin").await?);
//!
//! // Connect an encode output straight to a decode input
//! let (sink, source) = pipe(4);
//! ```

mod memory;
mod reed_solomon;
mod tokio_io;

pub use memory::{pipe, MemorySink, MemorySource, PipeSink, PipeSource, SinkRecord};
pub use reed_solomon::{coder_for, ReedSolomonCoder, XorCoder};
pub use tokio_io::{ReaderSource, WriterSink};
