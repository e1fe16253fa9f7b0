//! Stripeflow - Streaming Reed-Solomon Erasure Coding
//!
//! Encodes a byte stream into k data and m parity shard streams, decodes the
//! original from any k of them, and repairs lost shard streams, one stripe
//! at a time so memory stays bounded regardless of object size.
//!
//! # Architecture
//!
//! The crate follows a ports-and-adapters layout:
//!
//! ```text
//! adapters (channels, coders) → domain::ports (traits) → ec (pipelines)
//! ```
//!
//! # Modules
//!
//! - [`adapters`] - Channel and coder implementations of the domain ports
//! - [`config`] - Shard limits and pipeline configuration
//! - [`domain`] - Port traits the pipelines depend on
//! - [`ec`] - Stripe geometry, lane roles and the encode/decode/repair drivers
//! - [`error`] - Error types
//! - [`metrics`] - Per-operation counters and Prometheus metrics

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ec;
pub mod error;
pub mod metrics;

// Re-export commonly used types
pub use config::PipelineConfig;
pub use domain::{BoxSink, BoxSource, ByteSink, ByteSource, StripeCoder};
pub use ec::{
    decode, encode, repair, safe_stripe_size, LaneSet, OperationHandle, OperationKind,
    OperationReport, Pipeline,
};
pub use error::{Error, Result};
