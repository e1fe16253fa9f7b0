//! Operation Handle
//!
//! Returned by every encode/decode/repair call. Exposes the resolved code
//! parameters and lane roles, live progress, the terminal error once there
//! is one, and a future for the final report.

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::ec::context::{OperationContext, OperationKind};
use crate::ec::geometry::StripeGeometry;
use crate::ec::lanes::LaneSet;
use crate::error::{Error, Result};
use crate::metrics::OperationStats;

/// Summary of a successfully completed operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationReport {
    pub id: Uuid,
    pub kind: OperationKind,
    /// Stripes passed through the coder
    pub stripes: u64,
    /// Bytes pulled from the source lanes (the encode input, or the k lanes
    /// feeding the coder)
    pub bytes_read: u64,
    /// Bytes accepted by all output lanes
    pub bytes_written: u64,
    /// Most stripes ever resident at once
    pub peak_resident_stripes: usize,
    pub elapsed: Duration,
}

/// Handle to a running operation.
#[derive(Debug)]
pub struct OperationHandle {
    id: Uuid,
    kind: OperationKind,
    data_shards: usize,
    parity_shards: usize,
    stripe_size: usize,
    stripe_count: u64,
    sources: LaneSet,
    targets: LaneSet,
    terminal: Arc<OnceCell<Error>>,
    stats: Arc<OperationStats>,
    task: Option<JoinHandle<Result<OperationReport>>>,
}

impl OperationHandle {
    pub(crate) fn describe(ctx: &OperationContext) -> Self {
        let geometry = ctx.geometry();
        Self {
            id: ctx.id(),
            kind: ctx.kind(),
            data_shards: geometry.data_shards(),
            parity_shards: geometry.parity_shards(),
            stripe_size: geometry.stripe_size(),
            stripe_count: geometry.stripe_count(),
            sources: ctx.roles().sources(),
            targets: ctx.roles().targets(),
            terminal: ctx.terminal().clone(),
            stats: ctx.stats().clone(),
            task: None,
        }
    }

    /// A handle for an operation rejected before any stripe was allocated.
    pub(crate) fn failed(kind: OperationKind, geometry: &StripeGeometry, err: Error) -> Self {
        let terminal = OnceCell::new();
        let _ = terminal.set(err);
        Self {
            id: Uuid::new_v4(),
            kind,
            data_shards: geometry.data_shards(),
            parity_shards: geometry.parity_shards(),
            stripe_size: geometry.stripe_size(),
            stripe_count: geometry.stripe_count(),
            sources: LaneSet::empty(),
            targets: LaneSet::empty(),
            terminal: Arc::new(terminal),
            stats: Arc::new(OperationStats::new()),
            task: None,
        }
    }

    pub(crate) fn shared_stats(&self) -> Arc<OperationStats> {
        self.stats.clone()
    }

    pub(crate) fn with_task(mut self, task: JoinHandle<Result<OperationReport>>) -> Self {
        self.task = Some(task);
        self
    }

    /// Unique operation id, also attached to every log line
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Number of data shards (k)
    pub fn k(&self) -> usize {
        self.data_shards
    }

    /// Number of parity shards (m)
    pub fn m(&self) -> usize {
        self.parity_shards
    }

    /// Bytes per shard per stripe
    pub fn stripe_size(&self) -> usize {
        self.stripe_size
    }

    pub fn stripe_count(&self) -> u64 {
        self.stripe_count
    }

    /// Lanes feeding the coder
    pub fn sources(&self) -> LaneSet {
        self.sources
    }

    /// Lanes the coder computes
    pub fn targets(&self) -> LaneSet {
        self.targets
    }

    /// The terminal error, once the operation has failed.
    pub fn error(&self) -> Option<Error> {
        self.terminal.get().cloned()
    }

    /// `(stripes processed, total stripes)`
    pub fn progress(&self) -> (u64, u64) {
        (self.stats.stripes_processed(), self.stripe_count)
    }

    /// Live counters of this operation
    pub fn stats(&self) -> &OperationStats {
        &self.stats
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }

    /// Wait for the operation to end.
    pub async fn wait(mut self) -> Result<OperationReport> {
        let task = self
            .task
            .take()
            .ok_or_else(|| Error::Internal("operation has no task".to_string()))?;
        match task.await {
            Ok(result) => result,
            Err(e) => Err(Error::Internal(format!("operation task failed: {}", e))),
        }
    }
}
