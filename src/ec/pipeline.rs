//! Stripe Pipeline
//!
//! The loop shared by encode, decode and repair. Each round fills the next
//! stripe while the previous coded stripe drains to the outputs; the stripe
//! is only submitted once both have finished, so per-lane byte order is
//! preserved and at most two stripes are resident.
//!
//! ```text
//!   round n:   fill(n) ║ drain(n-1)   ──▶   submit(n)
//!   round n+1: fill(n+1) ║ drain(n)   ──▶   submit(n+1)
//!   ...
//!   end:       drain(last) ──▶ finish every output
//! ```

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn, Instrument};

use crate::domain::ports::BoxSink;
use crate::ec::context::{CodedStripe, OperationContext, OperationKind};
use crate::ec::geometry::StripeGeometry;
use crate::ec::handle::{OperationHandle, OperationReport};
use crate::ec::outputs::{OutputLanes, Piece};
use crate::error::{Error, Result};
use crate::metrics;

/// Input side of a pipeline: fills the context's current stripe.
#[async_trait]
pub(crate) trait StripeFill: Send {
    /// Read every lane the current stripe is waiting on. Returns with
    /// `ctx.waiting()` empty, or an error.
    async fn fill(&mut self, ctx: &mut OperationContext) -> Result<()>;
}

/// Spawn the operation on the ambient Tokio runtime.
pub(crate) fn spawn<F>(ctx: OperationContext, input: F, outputs: OutputLanes) -> Result<OperationHandle>
where
    F: StripeFill + 'static,
{
    let runtime = current_runtime()?;
    let handle = OperationHandle::describe(&ctx);
    let task = runtime.spawn(drive(ctx, input, outputs));
    Ok(handle.with_task(task))
}

/// Spawn an operation that failed before any I/O: the error is recorded
/// immediately and delivered to every output, no input is read.
pub(crate) fn spawn_failed(
    kind: OperationKind,
    geometry: &StripeGeometry,
    sinks: Vec<BoxSink>,
    err: Error,
) -> Result<OperationHandle> {
    let runtime = current_runtime()?;
    let handle = OperationHandle::failed(kind, geometry, err.clone());
    warn!(op = %handle.id(), kind = %kind, "Operation failed: {}", err);

    let mut outputs = OutputLanes::new(kind, handle.shared_stats());
    for sink in sinks {
        outputs.push(Piece::Payload, sink);
    }
    let task: JoinHandle<Result<OperationReport>> = runtime.spawn(async move {
        outputs.abort_all(&err).await;
        metrics::global().record_outcome(kind.as_str(), err.kind_label());
        Err(err)
    });
    Ok(handle.with_task(task))
}

fn current_runtime() -> Result<tokio::runtime::Handle> {
    tokio::runtime::Handle::try_current().map_err(|e| {
        Error::ContractViolation(format!("operations must start inside a Tokio runtime: {}", e))
    })
}

async fn drive<F: StripeFill>(
    mut ctx: OperationContext,
    mut input: F,
    mut outputs: OutputLanes,
) -> Result<OperationReport> {
    let span = tracing::info_span!(
        "operation",
        op = %ctx.id(),
        kind = %ctx.kind(),
        k = ctx.geometry().data_shards(),
        m = ctx.geometry().parity_shards(),
        stripe_size = ctx.geometry().stripe_size(),
    );
    async move {
        let started = Instant::now();
        let kind = ctx.kind();

        match pump(&mut ctx, &mut input, &mut outputs).await {
            Ok(()) => {
                let report = report(&ctx, started.elapsed());
                info!(
                    "{} complete: {} stripes, {} bytes in, {} bytes out",
                    kind, report.stripes, report.bytes_read, report.bytes_written
                );
                metrics::global().record_outcome(kind.as_str(), "ok");
                Ok(report)
            }
            Err(err) => {
                ctx.error(err.clone());
                let terminal = ctx.terminal_error().unwrap_or(err);
                outputs.abort_all(&terminal).await;
                metrics::global().record_outcome(kind.as_str(), terminal.kind_label());
                Err(terminal)
            }
        }
    }
    .instrument(span)
    .await
}

#[instrument(level = "debug", skip_all)]
async fn pump<F: StripeFill>(
    ctx: &mut OperationContext,
    input: &mut F,
    outputs: &mut OutputLanes,
) -> Result<()> {
    let mut pending: Option<CodedStripe> = None;

    while !ctx.is_done() {
        let draining = pending.take();
        tokio::try_join!(input.fill(ctx), outputs.drain(draining))?;

        if !ctx.can_submit() {
            return Err(Error::Internal(format!(
                "stripe {} incomplete after fill, waiting on {:?}",
                ctx.processed_stripe(),
                ctx.waiting()
            )));
        }
        pending = Some(ctx.submit_stripe().await?);
    }

    outputs.drain(pending.take()).await?;
    outputs.finish_all().await
}

fn report(ctx: &OperationContext, elapsed: Duration) -> OperationReport {
    let stats = ctx.stats();
    OperationReport {
        id: ctx.id(),
        kind: ctx.kind(),
        stripes: stats.stripes_processed(),
        bytes_read: stats.bytes_read(),
        bytes_written: stats.bytes_written(),
        peak_resident_stripes: stats.peak_resident_stripes(),
        elapsed,
    }
}
