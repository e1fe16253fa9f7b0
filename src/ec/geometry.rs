//! Stripe Geometry
//!
//! Pure arithmetic that fixes the per-shard stripe width `S` for an
//! operation and answers how many stripes an object spans and how many
//! payload bytes each one carries.

use crate::config::{DEFAULT_BUFFER_CEILING, STRIPE_ALIGNMENT};
use crate::error::{Error, Result};

/// Largest 8-aligned value representable as `u32`.
const MAX_ALIGNED_U32: u64 = (u32::MAX as u64) & !(STRIPE_ALIGNMENT as u64 - 1);

/// Compute a safe stripe size for `k` data and `m` parity shards.
///
/// The hint is rounded up to the next multiple of 8 and then capped so that
/// `max(k, m) * S` stays within the default channel buffering ceiling.
/// Never fails: out-of-range inputs saturate.
pub fn safe_stripe_size(data_shards: usize, parity_shards: usize, hint: u32) -> u32 {
    safe_stripe_size_with_ceiling(data_shards, parity_shards, hint, DEFAULT_BUFFER_CEILING)
}

/// [`safe_stripe_size`] against an explicit buffering ceiling.
pub fn safe_stripe_size_with_ceiling(
    data_shards: usize,
    parity_shards: usize,
    hint: u32,
    ceiling: usize,
) -> u32 {
    let align = STRIPE_ALIGNMENT as u64;
    let rounded = (hint as u64).div_ceil(align) * align;
    let rounded = rounded.clamp(align, MAX_ALIGNED_U32);

    let widest = data_shards.max(parity_shards).max(1) as u64;
    let max_stripe = (ceiling as u64 / widest) / align * align;
    let max_stripe = max_stripe.clamp(align, MAX_ALIGNED_U32);

    rounded.min(max_stripe) as u32
}

// =============================================================================
// Stripe Geometry
// =============================================================================

/// Fixed layout of one operation: shard counts, stripe width and object size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StripeGeometry {
    data_shards: usize,
    parity_shards: usize,
    stripe_size: usize,
    object_size: u64,
    stripe_count: u64,
}

impl StripeGeometry {
    /// Build the geometry for an object of `object_size` bytes.
    ///
    /// `stripe_size` must already be a non-zero multiple of 8.
    pub fn new(
        data_shards: usize,
        parity_shards: usize,
        stripe_size: u32,
        object_size: u64,
    ) -> Result<Self> {
        if stripe_size == 0 || stripe_size as usize % STRIPE_ALIGNMENT != 0 {
            return Err(Error::ContractViolation(format!(
                "stripe size must be a non-zero multiple of {}, got {}",
                STRIPE_ALIGNMENT, stripe_size
            )));
        }
        let stripe_size = stripe_size as usize;
        let row = (data_shards * stripe_size) as u64;
        Ok(Self {
            data_shards,
            parity_shards,
            stripe_size,
            object_size,
            stripe_count: object_size.div_ceil(row),
        })
    }

    /// Number of data shards (k)
    pub fn data_shards(&self) -> usize {
        self.data_shards
    }

    /// Number of parity shards (m)
    pub fn parity_shards(&self) -> usize {
        self.parity_shards
    }

    /// k + m
    pub fn total_shards(&self) -> usize {
        self.data_shards + self.parity_shards
    }

    /// Bytes per shard per stripe (S)
    pub fn stripe_size(&self) -> usize {
        self.stripe_size
    }

    /// True object length in bytes
    pub fn object_size(&self) -> u64 {
        self.object_size
    }

    /// `ceil(size / (k * S))`
    pub fn stripe_count(&self) -> u64 {
        self.stripe_count
    }

    /// Length of the data half of a stripe (k * S)
    pub fn data_len(&self) -> usize {
        self.data_shards * self.stripe_size
    }

    /// Length of the parity half of a stripe (m * S)
    pub fn parity_len(&self) -> usize {
        self.parity_shards * self.stripe_size
    }

    /// True payload bytes carried by stripe `index`: k * S for every stripe
    /// except the last, which carries the remainder.
    pub fn payload_len(&self, index: u64) -> usize {
        let row = self.data_len() as u64;
        let consumed = index.saturating_mul(row);
        self.object_size.saturating_sub(consumed).min(row) as usize
    }

    /// Whether `lane` indexes the data half.
    pub fn is_data_lane(&self, lane: usize) -> bool {
        lane < self.data_shards
    }

    /// Byte range of `lane` within its half of the stripe.
    pub fn lane_range(&self, lane: usize) -> std::ops::Range<usize> {
        let in_half = if self.is_data_lane(lane) {
            lane
        } else {
            lane - self.data_shards
        };
        let start = in_half * self.stripe_size;
        start..start + self.stripe_size
    }
}
