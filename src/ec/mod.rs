//! Erasure Coding Module
//!
//! Streaming Reed-Solomon encode, decode and repair over per-shard byte
//! channels. Objects are processed one stripe at a time so memory stays
//! bounded regardless of object size.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Erasure Coding Module                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                          │
//! │  ┌──────────────┐    ┌──────────────┐    ┌───────────────────────────┐  │
//! │  │    Encode    │    │    Decode    │    │         Repair            │  │
//! │  │    Driver    │    │    Driver    │    │         Driver            │  │
//! │  └──────────────┘    └──────────────┘    └───────────────────────────┘  │
//! │         │                   │                         │                  │
//! │         └───────────────────┼─────────────────────────┘                  │
//! │                             │                                            │
//! │                   ┌─────────┴─────────┐     ┌────────────────────┐       │
//! │                   │  Stripe Pipeline  │────▶│   Output Lanes     │       │
//! │                   │ (OperationContext)│     │ (drain / finish)   │       │
//! │                   └─────────┬─────────┘     └────────────────────┘       │
//! │                             │                                            │
//! │                   ┌─────────┴─────────┐                                  │
//! │                   │   StripeCoder     │  (adapters::reed_solomon)        │
//! │                   └───────────────────┘                                  │
//! │                                                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - **Geometry** (`geometry.rs`): safe stripe size and per-stripe payload
//!   arithmetic.
//! - **Lanes** (`lanes.rs`): lane bitmasks and source/target selection for
//!   each operation kind.
//! - **Context** (`context.rs`): the per-operation state machine; owns the
//!   stripe buffers and the terminal error.
//! - **Pipeline** (`pipeline.rs`): overlaps filling stripe n with draining
//!   stripe n-1.
//! - **Drivers** (`encoder.rs`, `decoder.rs`, `repair.rs`): argument checks,
//!   role selection and the input side of each operation.
//!
//! # Usage
//!
//! ```rust,ignore
//! use stripeflow::adapters::{MemorySink, MemorySource};
//! use stripeflow::ec;
//!
//! let data: Vec<BoxSink> = (0..4).map(|_| Box::new(MemorySink::new()) as BoxSink).collect();
//! let parity: Vec<BoxSink> = (0..2).map(|_| Box::new(MemorySink::new()) as BoxSink).collect();
//!
//! let handle = ec::encode(MemorySource::new(object), len, data, parity, 64 * 1024)?;
//! let report = handle.wait().await?;
//! ```

use std::fmt;
use std::sync::Arc;

mod context;
mod decoder;
mod encoder;
mod geometry;
mod handle;
mod lanes;
mod outputs;
mod pipeline;
mod repair;

#[cfg(test)]
mod proptest;

pub use context::{CodedStripe, OperationKind};
pub use geometry::{safe_stripe_size, safe_stripe_size_with_ceiling, StripeGeometry};
pub use handle::{OperationHandle, OperationReport};
pub use lanes::{LaneRoles, LaneSet};

use crate::adapters::coder_for;
use crate::config::{PipelineConfig, STRIPE_ALIGNMENT};
use crate::domain::ports::{BoxSink, BoxSource, ByteSink, ByteSource, StripeCoder};
use crate::error::{Error, Result};

// =============================================================================
// Pipeline
// =============================================================================

/// Entry point for encode, decode and repair.
///
/// Holds the configuration shared by the operations it starts and,
/// optionally, a coder to use instead of the process-wide cached one.
/// Every operation must be started inside a Tokio runtime; the returned
/// [`OperationHandle`] is independent of the `Pipeline`. A stripe size hint
/// of 0 selects [`PipelineConfig::default_stripe_size`].
#[derive(Clone, Default)]
pub struct Pipeline {
    config: PipelineConfig,
    coder: Option<Arc<dyn StripeCoder>>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("custom_coder", &self.coder.is_some())
            .finish()
    }
}

impl Pipeline {
    /// Create a pipeline with a validated configuration.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            coder: None,
        })
    }

    /// Use `coder` for every operation. Its k and m must match the lane
    /// counts of each call.
    pub fn with_coder(mut self, coder: Arc<dyn StripeCoder>) -> Self {
        self.coder = Some(coder);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Stripe size this pipeline would pick for `k`, `m` and `hint`.
    ///
    /// A hint of 0 asks for the configured `default_stripe_size`.
    pub fn stripe_size(&self, data_shards: usize, parity_shards: usize, hint: u32) -> u32 {
        let hint = if hint == 0 {
            self.config.default_stripe_size
        } else {
            hint
        };
        safe_stripe_size_with_ceiling(data_shards, parity_shards, hint, self.config.buffer_ceiling)
    }

    fn geometry(
        &self,
        data_shards: usize,
        parity_shards: usize,
        hint: u32,
        size: u64,
    ) -> Result<StripeGeometry> {
        if hint as usize % STRIPE_ALIGNMENT != 0 {
            return Err(Error::ContractViolation(format!(
                "stripe size hint must be a multiple of {}, got {}",
                STRIPE_ALIGNMENT, hint
            )));
        }
        let stripe_size = self.stripe_size(data_shards, parity_shards, hint);
        StripeGeometry::new(data_shards, parity_shards, stripe_size, size)
    }

    fn coder(&self, data_shards: usize, parity_shards: usize) -> Result<Arc<dyn StripeCoder>> {
        match &self.coder {
            Some(coder)
                if coder.data_shards() == data_shards && coder.parity_shards() == parity_shards =>
            {
                Ok(coder.clone())
            }
            Some(coder) => Err(Error::ContractViolation(format!(
                "coder is {}+{} but the operation is {}+{}",
                coder.data_shards(),
                coder.parity_shards(),
                data_shards,
                parity_shards
            ))),
            None => coder_for(data_shards, parity_shards),
        }
    }
}

// =============================================================================
// Default Entry Points
// =============================================================================

/// Encode with the default pipeline. See [`Pipeline::encode`].
pub fn encode(
    input: impl ByteSource + 'static,
    size: u64,
    data_outputs: Vec<BoxSink>,
    parity_outputs: Vec<BoxSink>,
    stripe_size_hint: u32,
) -> Result<OperationHandle> {
    Pipeline::default().encode(input, size, data_outputs, parity_outputs, stripe_size_hint)
}

/// Decode with the default pipeline. See [`Pipeline::decode`].
pub fn decode(
    output: impl ByteSink + 'static,
    size: u64,
    data_inputs: Vec<Option<BoxSource>>,
    parity_inputs: Vec<Option<BoxSource>>,
    stripe_size_hint: u32,
) -> Result<OperationHandle> {
    Pipeline::default().decode(output, size, data_inputs, parity_inputs, stripe_size_hint)
}

/// Repair with the default pipeline. See [`Pipeline::repair`].
pub fn repair(
    data_shards: usize,
    parity_shards: usize,
    inputs: Vec<Option<BoxSource>>,
    outputs: Vec<Option<BoxSink>>,
    size: u64,
    stripe_size_hint: u32,
) -> Result<OperationHandle> {
    Pipeline::default().repair(data_shards, parity_shards, inputs, outputs, size, stripe_size_hint)
}
