//! Shared Operation Context
//!
//! One [`OperationContext`] exists per encode, decode or repair call. It owns
//! the current stripe's buffers, the per-stripe `waiting` bitfield, stripe
//! progress, the single in-flight flag and the once-settable terminal error.
//!
//! # Stripe Lifecycle
//!
//! ```text
//!   allocate ──▶ fill lanes ──▶ submit ──▶ coder ──▶ CodedStripe ──▶ drain
//!      ▲        (waiting→0)   (in flight)             (outputs)
//!      └──────────────── next stripe allocated on success ─────────┘
//! ```
//!
//! At most one stripe is in flight. The next stripe is allocated as soon as
//! the coder returns, so one stripe can fill while the previous one drains
//! to the outputs: never more than two stripes are resident.
//!
//! # Buffer Ownership
//!
//! Lanes read straight into their slot of the stripe buffer (one copy from
//! the channel, no aliasing of channel memory). Buffers move into the coder
//! by value and come back with it, then freeze into [`CodedStripe`] whose
//! per-lane pieces are zero-copy `Bytes` slices handed to the sinks.

use std::fmt;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use once_cell::sync::OnceCell;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::ports::{ByteSource, StripeCoder};
use crate::ec::geometry::StripeGeometry;
use crate::ec::lanes::{LaneRoles, LaneSet};
use crate::error::{Error, Result};
use crate::metrics::{self, OperationStats};

// =============================================================================
// Operation Kind
// =============================================================================

/// Which pipeline an operation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Encode,
    Decode,
    Repair,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Encode => "encode",
            OperationKind::Decode => "decode",
            OperationKind::Repair => "repair",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Stripe Buffers
// =============================================================================

/// Counts a stripe as resident for as long as it lives.
#[derive(Debug)]
struct ResidentGuard {
    stats: Arc<OperationStats>,
}

impl ResidentGuard {
    fn new(stats: Arc<OperationStats>) -> Self {
        stats.stripe_allocated();
        Self { stats }
    }
}

impl Drop for ResidentGuard {
    fn drop(&mut self) {
        self.stats.stripe_released();
    }
}

/// Mutable buffers of the stripe currently being filled.
#[derive(Debug)]
pub(crate) struct StripeBuffers {
    data: BytesMut,
    parity: BytesMut,
    resident: ResidentGuard,
}

impl StripeBuffers {
    fn allocate(geometry: &StripeGeometry, stats: Arc<OperationStats>) -> Self {
        Self {
            data: BytesMut::zeroed(geometry.data_len()),
            parity: BytesMut::zeroed(geometry.parity_len()),
            resident: ResidentGuard::new(stats),
        }
    }

    /// The k * S data half
    pub(crate) fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Both halves at once, for lane-indexed filling.
    pub(crate) fn halves_mut(&mut self) -> (&mut [u8], &mut [u8]) {
        (&mut self.data, &mut self.parity)
    }
}

/// A stripe after the coder ran: every lane holds its true bytes.
#[derive(Debug)]
pub struct CodedStripe {
    index: u64,
    data: Bytes,
    parity: Bytes,
    geometry: StripeGeometry,
    _resident: ResidentGuard,
}

impl CodedStripe {
    /// Stripe number within the object
    pub fn index(&self) -> u64 {
        self.index
    }

    /// The S bytes of `lane`.
    pub fn lane(&self, lane: usize) -> Bytes {
        let half = if self.geometry.is_data_lane(lane) {
            &self.data
        } else {
            &self.parity
        };
        half.slice(self.geometry.lane_range(lane))
    }

    /// The object bytes this stripe carries, padding removed.
    pub fn payload(&self) -> Bytes {
        self.data.slice(..self.geometry.payload_len(self.index))
    }
}

// =============================================================================
// Operation Context
// =============================================================================

/// Per-operation state with explicit transitions.
pub(crate) struct OperationContext {
    id: Uuid,
    kind: OperationKind,
    geometry: StripeGeometry,
    roles: LaneRoles,
    coder: Arc<dyn StripeCoder>,
    offload_coding: bool,

    buffers: Option<StripeBuffers>,
    waiting: LaneSet,
    processed_stripe: u64,
    in_flight: bool,

    terminal: Arc<OnceCell<Error>>,
    stats: Arc<OperationStats>,
}

impl fmt::Debug for OperationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationContext")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("geometry", &self.geometry)
            .field("roles", &self.roles)
            .field("waiting", &self.waiting)
            .field("processed_stripe", &self.processed_stripe)
            .field("in_flight", &self.in_flight)
            .finish()
    }
}

impl OperationContext {
    pub(crate) fn new(
        kind: OperationKind,
        geometry: StripeGeometry,
        roles: LaneRoles,
        coder: Arc<dyn StripeCoder>,
        offload_coding: bool,
    ) -> Self {
        let stats = Arc::new(OperationStats::new());
        let mut ctx = Self {
            id: Uuid::new_v4(),
            kind,
            geometry,
            roles,
            coder,
            offload_coding,
            buffers: None,
            waiting: LaneSet::empty(),
            processed_stripe: 0,
            in_flight: false,
            terminal: Arc::new(OnceCell::new()),
            stats,
        };
        if !ctx.is_done() {
            ctx.begin_stripe();
        }
        ctx
    }

    fn begin_stripe(&mut self) {
        self.buffers = Some(StripeBuffers::allocate(&self.geometry, self.stats.clone()));
        self.waiting = self.roles.sources();
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn kind(&self) -> OperationKind {
        self.kind
    }

    pub(crate) fn geometry(&self) -> &StripeGeometry {
        &self.geometry
    }

    pub(crate) fn roles(&self) -> &LaneRoles {
        &self.roles
    }

    pub(crate) fn stats(&self) -> &Arc<OperationStats> {
        &self.stats
    }

    pub(crate) fn terminal(&self) -> &Arc<OnceCell<Error>> {
        &self.terminal
    }

    pub(crate) fn processed_stripe(&self) -> u64 {
        self.processed_stripe
    }

    /// Every stripe has been through the coder.
    pub(crate) fn is_done(&self) -> bool {
        self.processed_stripe == self.geometry.stripe_count()
    }

    /// Lanes of the current stripe still unfilled
    pub(crate) fn waiting(&self) -> LaneSet {
        self.waiting
    }

    /// Clear `mask` from the waiting set.
    pub(crate) fn mark_lane_filled(&mut self, mask: LaneSet) {
        self.waiting.clear(mask);
    }

    /// The current stripe is ready for the coder.
    pub(crate) fn can_submit(&self) -> bool {
        self.waiting.is_empty()
    }

    /// Readers hold off while a stripe is with the coder.
    pub(crate) fn should_pause_reading(&self) -> bool {
        self.in_flight
    }

    /// Buffers of the current stripe together with its waiting set.
    pub(crate) fn fill_view(&mut self) -> Result<(&mut StripeBuffers, &mut LaneSet)> {
        match self.buffers.as_mut() {
            Some(buffers) => Ok((buffers, &mut self.waiting)),
            None => Err(Error::Internal(format!(
                "no stripe buffers for stripe {}",
                self.processed_stripe
            ))),
        }
    }

    /// Account bytes pulled from input lanes.
    pub(crate) fn record_read(&self, bytes: usize) {
        self.stats.record_read(bytes);
        metrics::global().record_read(self.kind.as_str(), bytes);
    }

    /// Record the terminal error. First caller wins; returns whether this
    /// call set it.
    pub(crate) fn error(&self, err: Error) -> bool {
        let won = self.terminal.set(err).is_ok();
        if won {
            if let Some(err) = self.terminal.get() {
                warn!(op = %self.id, kind = %self.kind, "Operation failed: {}", err);
            }
        }
        won
    }

    pub(crate) fn terminal_error(&self) -> Option<Error> {
        self.terminal.get().cloned()
    }

    /// Hand the filled stripe to the coder and wait for it.
    ///
    /// # Panics
    ///
    /// If lanes are still waiting or another stripe is already in flight.
    pub(crate) async fn submit_stripe(&mut self) -> Result<CodedStripe> {
        assert!(
            self.can_submit(),
            "stripe submitted with unfilled lanes {:?}",
            self.waiting
        );
        assert!(!self.in_flight, "stripe submitted while another is in flight");
        if let Some(err) = self.terminal_error() {
            return Err(err);
        }

        let buffers = self.buffers.take().ok_or_else(|| {
            Error::Internal(format!("no stripe buffers for stripe {}", self.processed_stripe))
        })?;
        let index = self.processed_stripe;

        self.in_flight = true;
        debug!(op = %self.id, stripe = index, "Submitting stripe");
        let outcome = self.run_coder(buffers).await;
        self.in_flight = false;

        let buffers = match outcome {
            Ok(buffers) => buffers,
            Err(err) => {
                self.error(err.clone());
                return Err(err);
            }
        };

        self.processed_stripe += 1;
        self.stats.record_stripe();
        metrics::global().record_stripe(self.kind.as_str());
        debug!(
            op = %self.id,
            stripe = index,
            "Stripe coded ({}/{})",
            self.processed_stripe,
            self.geometry.stripe_count()
        );

        if !self.is_done() {
            // readers resume on the next fill
            self.begin_stripe();
        }

        Ok(CodedStripe {
            index,
            data: buffers.data.freeze(),
            parity: buffers.parity.freeze(),
            geometry: self.geometry,
            _resident: buffers.resident,
        })
    }

    async fn run_coder(&self, mut buffers: StripeBuffers) -> Result<StripeBuffers> {
        let sources = self.roles.sources();
        let targets = self.roles.targets();
        let shard_len = self.geometry.stripe_size();

        if targets.is_empty() {
            // nothing to compute; complete on a later poll like a real call
            tokio::task::yield_now().await;
            return Ok(buffers);
        }

        let coder = self.coder.clone();
        if self.offload_coding {
            tokio::task::spawn_blocking(move || {
                let (data, parity) = buffers.halves_mut();
                coder
                    .code(sources, targets, data, parity, shard_len)
                    .map(|_| buffers)
            })
            .await
            .map_err(|e| Error::CodingPrimitive(format!("coding task failed: {}", e)))?
        } else {
            tokio::task::yield_now().await;
            let (data, parity) = buffers.halves_mut();
            coder.code(sources, targets, data, parity, shard_len)?;
            Ok(buffers)
        }
    }
}

/// Read until `buf` is full or the source ends; returns the bytes read.
pub(crate) async fn read_full<S: ByteSource + ?Sized>(source: &mut S, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = source.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
