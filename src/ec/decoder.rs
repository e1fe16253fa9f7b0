//! Decode Driver
//!
//! Reassembles the original object from any k of its k + m shard streams.
//! Present data lanes are preferred as sources; missing data lanes are
//! reconstructed per stripe and the data half is written to the single
//! output with the final stripe's padding removed.
//!
//! Present lanes that are not sources are detached before the first stripe
//! and drained to end of stream on their own task, so their producers never
//! stall and a slow one never holds back a stripe. Their bytes are
//! discarded. Such a lane failing is logged; it does not fail the operation.

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, warn, Instrument};
use uuid::Uuid;

use crate::config::validate_shard_counts;
use crate::domain::ports::{BoxSink, BoxSource, ByteSink, ByteSource};
use crate::ec::context::{read_full, OperationContext, OperationKind};
use crate::ec::handle::OperationHandle;
use crate::ec::lanes::{LaneRoles, LaneSet};
use crate::ec::outputs::{OutputLanes, Piece};
use crate::ec::pipeline::{self, StripeFill};
use crate::ec::Pipeline;
use crate::error::{Error, Result};

/// Per-lane inputs indexed `0..k+m`; `None` marks a missing lane.
///
/// Shared by decode and repair.
pub(crate) struct LaneInputs {
    lanes: Vec<Option<BoxSource>>,
}

impl LaneInputs {
    pub(crate) fn new(lanes: Vec<Option<BoxSource>>) -> Self {
        Self { lanes }
    }

    /// Lanes with an input attached
    pub(crate) fn present(&self) -> LaneSet {
        self.lanes
            .iter()
            .enumerate()
            .filter(|(_, lane)| lane.is_some())
            .map(|(index, _)| index)
            .collect()
    }

    /// Take every present lane outside `sources` out of the stripe path.
    pub(crate) fn detach_unused(&mut self, sources: LaneSet) -> Vec<(usize, BoxSource)> {
        self.lanes
            .iter_mut()
            .enumerate()
            .filter(|(lane, _)| !sources.contains(*lane))
            .filter_map(|(lane, input)| input.take().map(|source| (lane, source)))
            .collect()
    }
}

/// Drain detached lanes to end of stream in the background.
///
/// Must be called inside a Tokio runtime.
pub(crate) fn spawn_unused_drains(op: Uuid, lanes: Vec<(usize, BoxSource)>, shard_len: usize) {
    for (lane, source) in lanes {
        let span = tracing::debug_span!("unused_lane", op = %op, lane);
        tokio::spawn(drain_unused(lane, source, shard_len).instrument(span));
    }
}

async fn drain_unused(lane: usize, mut source: BoxSource, shard_len: usize) {
    let mut scratch = vec![0u8; shard_len];
    let mut drained = 0u64;
    loop {
        match source.read(&mut scratch).await {
            Ok(0) => break,
            Ok(n) => drained += n as u64,
            Err(e) => {
                warn!(lane, "Dropping unused input lane after {} bytes: {}", drained, e);
                return;
            }
        }
    }
    debug!(lane, "Unused input lane drained: {} bytes", drained);
}

#[async_trait]
impl StripeFill for LaneInputs {
    async fn fill(&mut self, ctx: &mut OperationContext) -> Result<()> {
        debug_assert!(!ctx.should_pause_reading(), "fill while a stripe is in flight");

        let index = ctx.processed_stripe();
        let shard_len = ctx.geometry().stripe_size();

        let mut bytes = 0;
        {
            let (buffers, waiting) = ctx.fill_view()?;
            let (data, parity) = buffers.halves_mut();
            let slots = data.chunks_mut(shard_len).chain(parity.chunks_mut(shard_len));
            let wanted = *waiting;

            let mut reads: FuturesUnordered<_> = self
                .lanes
                .iter_mut()
                .zip(slots)
                .enumerate()
                .filter(|(lane, _)| wanted.contains(*lane))
                .filter_map(|(lane, (input, slot))| {
                    let source = input.as_mut()?;
                    Some(async move { (lane, read_full(&mut **source, slot).await) })
                })
                .collect();

            while let Some((lane, result)) = reads.next().await {
                match result {
                    Ok(n) if n == shard_len => {
                        bytes += n;
                        waiting.remove(lane);
                    }
                    Ok(n) => {
                        return Err(Error::Upstream {
                            lane: Some(lane),
                            reason: format!(
                                "lane ended in stripe {} after {} of {} bytes",
                                index, n, shard_len
                            ),
                        })
                    }
                    Err(e) => return Err(Error::upstream(Some(lane), e)),
                }
            }
        }

        ctx.record_read(bytes);
        Ok(())
    }
}

impl Pipeline {
    /// Decode `size` bytes from the shard streams into `output`.
    ///
    /// `data_inputs` and `parity_inputs` are indexed by shard position; at
    /// least `data_inputs.len()` of all entries must be `Some`. With fewer,
    /// the operation fails with [`Error::InsufficientShards`] before any
    /// input is read.
    pub fn decode(
        &self,
        output: impl ByteSink + 'static,
        size: u64,
        data_inputs: Vec<Option<BoxSource>>,
        parity_inputs: Vec<Option<BoxSource>>,
        stripe_size_hint: u32,
    ) -> Result<OperationHandle> {
        let k = data_inputs.len();
        let m = parity_inputs.len();
        validate_shard_counts(k, m)?;
        let geometry = self.geometry(k, m, stripe_size_hint, size)?;
        let coder = self.coder(k, m)?;

        let mut inputs = LaneInputs::new(data_inputs.into_iter().chain(parity_inputs).collect());
        let output: BoxSink = Box::new(output);

        let roles = match LaneRoles::for_decode(k, m, inputs.present()) {
            Ok(roles) => roles,
            Err(err) => {
                return pipeline::spawn_failed(OperationKind::Decode, &geometry, vec![output], err);
            }
        };

        let ctx = OperationContext::new(
            OperationKind::Decode,
            geometry,
            roles,
            coder,
            self.config().offload_coding,
        );
        let mut outputs = OutputLanes::new(OperationKind::Decode, ctx.stats().clone());
        outputs.push(Piece::Payload, output);
        let unused = inputs.detach_unused(roles.sources());

        debug!(
            op = %ctx.id(),
            "Decoding {} bytes from {}+{}: sources {:?}, reconstructing {:?}",
            size,
            k,
            m,
            roles.sources(),
            roles.targets()
        );

        let op = ctx.id();
        let handle = pipeline::spawn(ctx, inputs, outputs)?;
        spawn_unused_drains(op, unused, geometry.stripe_size());
        Ok(handle)
    }
}
