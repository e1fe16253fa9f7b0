//! Encode Driver
//!
//! Pulls one input stream stripe by stripe (k * S bytes at a time, the exact
//! remainder on the last stripe), zero-pads a short final stripe, computes
//! the m parity slices and fans all k + m slices out to their outputs in
//! lane order.

use async_trait::async_trait;
use tracing::debug;

use crate::config::validate_shard_counts;
use crate::domain::ports::{BoxSink, BoxSource, ByteSource};
use crate::ec::context::{read_full, OperationContext, OperationKind};
use crate::ec::handle::OperationHandle;
use crate::ec::lanes::LaneRoles;
use crate::ec::outputs::{OutputLanes, Piece};
use crate::ec::pipeline::{self, StripeFill};
use crate::ec::Pipeline;
use crate::error::{Error, Result};

/// The single input of an encode.
struct EncodeInput {
    source: BoxSource,
}

#[async_trait]
impl StripeFill for EncodeInput {
    async fn fill(&mut self, ctx: &mut OperationContext) -> Result<()> {
        debug_assert!(!ctx.should_pause_reading(), "fill while a stripe is in flight");

        let index = ctx.processed_stripe();
        let want = ctx.geometry().payload_len(index);
        let data_lanes = ctx.roles().data_lanes();

        let (buffers, _) = ctx.fill_view()?;
        let data = buffers.data_mut();
        let got = read_full(&mut *self.source, &mut data[..want])
            .await
            .map_err(|e| Error::upstream(None, e))?;
        if got < want {
            return Err(Error::Upstream {
                lane: None,
                reason: format!(
                    "input ended in stripe {} after {} of {} bytes",
                    index, got, want
                ),
            });
        }
        // short final stripe
        data[want..].fill(0);

        ctx.record_read(got);
        ctx.mark_lane_filled(data_lanes);
        Ok(())
    }
}

impl Pipeline {
    /// Encode `size` bytes from `input` into `data_outputs.len()` data shards
    /// and `parity_outputs.len()` parity shards.
    ///
    /// Every output receives `stripe_count * S` bytes; the final stripe's
    /// padding is zeros.
    pub fn encode(
        &self,
        input: impl ByteSource + 'static,
        size: u64,
        data_outputs: Vec<BoxSink>,
        parity_outputs: Vec<BoxSink>,
        stripe_size_hint: u32,
    ) -> Result<OperationHandle> {
        let k = data_outputs.len();
        let m = parity_outputs.len();
        validate_shard_counts(k, m)?;
        let geometry = self.geometry(k, m, stripe_size_hint, size)?;
        let coder = self.coder(k, m)?;

        let ctx = OperationContext::new(
            OperationKind::Encode,
            geometry,
            LaneRoles::for_encode(k, m),
            coder,
            self.config().offload_coding,
        );

        let mut outputs = OutputLanes::new(OperationKind::Encode, ctx.stats().clone());
        for (lane, sink) in data_outputs.into_iter().chain(parity_outputs).enumerate() {
            outputs.push(Piece::Lane(lane), sink);
        }

        debug!(
            op = %ctx.id(),
            "Encoding {} bytes as {}+{} in {} stripes of {} bytes",
            size,
            k,
            m,
            geometry.stripe_count(),
            geometry.stripe_size()
        );

        pipeline::spawn(
            ctx,
            EncodeInput {
                source: Box::new(input),
            },
            outputs,
        )
    }
}
