//! Repair Driver
//!
//! Regenerates selected shard streams directly from any k surviving ones,
//! without reassembling the object. Inputs and outputs are both indexed
//! `0..k+m`: a `Some` input is a surviving shard, a `Some` output is a shard
//! to produce. Requested lanes that are also sources are re-emitted from
//! their input bytes; surviving lanes beyond the k sources are drained in
//! the background like decode's.

use tracing::debug;

use crate::config::validate_shard_counts;
use crate::domain::ports::{BoxSink, BoxSource};
use crate::ec::context::{OperationContext, OperationKind};
use crate::ec::decoder::{spawn_unused_drains, LaneInputs};
use crate::ec::handle::OperationHandle;
use crate::ec::lanes::{LaneRoles, LaneSet};
use crate::ec::outputs::{OutputLanes, Piece};
use crate::ec::pipeline;
use crate::ec::Pipeline;
use crate::error::{Error, Result};

impl Pipeline {
    /// Rebuild the shard streams named by `outputs` from `inputs`.
    pub fn repair(
        &self,
        data_shards: usize,
        parity_shards: usize,
        inputs: Vec<Option<BoxSource>>,
        outputs: Vec<Option<BoxSink>>,
        size: u64,
        stripe_size_hint: u32,
    ) -> Result<OperationHandle> {
        validate_shard_counts(data_shards, parity_shards)?;
        let total = data_shards + parity_shards;
        if inputs.len() != total || outputs.len() != total {
            return Err(Error::ContractViolation(format!(
                "repair of {}+{} needs {} inputs and outputs, got {} and {}",
                data_shards,
                parity_shards,
                total,
                inputs.len(),
                outputs.len()
            )));
        }
        let geometry = self.geometry(data_shards, parity_shards, stripe_size_hint, size)?;
        let coder = self.coder(data_shards, parity_shards)?;

        let mut inputs = LaneInputs::new(inputs);
        let requested: LaneSet = outputs
            .iter()
            .enumerate()
            .filter(|(_, output)| output.is_some())
            .map(|(lane, _)| lane)
            .collect();
        let sinks: Vec<(usize, BoxSink)> = outputs
            .into_iter()
            .enumerate()
            .filter_map(|(lane, output)| output.map(|sink| (lane, sink)))
            .collect();

        let roles = match LaneRoles::for_repair(data_shards, parity_shards, inputs.present(), requested) {
            Ok(roles) => roles,
            Err(err) => {
                let sinks = sinks.into_iter().map(|(_, sink)| sink).collect();
                return pipeline::spawn_failed(OperationKind::Repair, &geometry, sinks, err);
            }
        };

        let ctx = OperationContext::new(
            OperationKind::Repair,
            geometry,
            roles,
            coder,
            self.config().offload_coding,
        );
        let mut lanes = OutputLanes::new(OperationKind::Repair, ctx.stats().clone());
        for (lane, sink) in sinks {
            lanes.push(Piece::Lane(lane), sink);
        }
        let unused = inputs.detach_unused(roles.sources());

        debug!(
            op = %ctx.id(),
            "Repairing {:?} of {}+{} from {:?}",
            requested,
            data_shards,
            parity_shards,
            roles.sources()
        );

        let op = ctx.id();
        let handle = pipeline::spawn(ctx, inputs, lanes)?;
        spawn_unused_drains(op, unused, geometry.stripe_size());
        Ok(handle)
    }
}
