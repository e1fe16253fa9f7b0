//! Lane Sets and Role Selection
//!
//! A lane is one of the k + m shard positions of an operation: data lanes
//! occupy `[0, k)` and parity lanes `[k, k + m)`. [`LaneSet`] is the bitmask
//! over those positions and [`LaneRoles`] the pair of masks handed to the
//! coding primitive for every stripe.
//!
//! Role invariants, checked on construction:
//!
//! - `sources.count() == k`
//! - `sources & targets == 0`

use std::fmt;
use std::ops::{BitAnd, BitOr, Not};

use crate::error::{Error, Result};

// =============================================================================
// Lane Set
// =============================================================================

/// Bitmask over lane indices `0..64`.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct LaneSet(u64);

impl LaneSet {
    /// No lanes.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Build from raw bits.
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// A single lane.
    pub fn single(lane: usize) -> Self {
        debug_assert!(lane < 64);
        Self(1 << lane)
    }

    /// Lanes `start..end`.
    pub fn range(start: usize, end: usize) -> Self {
        debug_assert!(start <= end && end <= 64);
        let width = end - start;
        if width == 0 {
            return Self(0);
        }
        let ones = if width == 64 { u64::MAX } else { (1u64 << width) - 1 };
        Self(ones << start)
    }

    /// Raw bits.
    pub const fn bits(&self) -> u64 {
        self.0
    }

    pub fn contains(&self, lane: usize) -> bool {
        lane < 64 && self.0 & (1 << lane) != 0
    }

    pub fn insert(&mut self, lane: usize) {
        debug_assert!(lane < 64);
        self.0 |= 1 << lane;
    }

    pub fn remove(&mut self, lane: usize) {
        debug_assert!(lane < 64);
        self.0 &= !(1 << lane);
    }

    /// Clear every lane in `mask`.
    pub fn clear(&mut self, mask: LaneSet) {
        self.0 &= !mask.0;
    }

    /// Population count.
    pub fn count(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn is_disjoint(&self, other: LaneSet) -> bool {
        self.0 & other.0 == 0
    }

    pub fn is_subset(&self, other: LaneSet) -> bool {
        self.0 & !other.0 == 0
    }

    /// Lane indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> {
        let mut bits = self.0;
        std::iter::from_fn(move || {
            if bits == 0 {
                return None;
            }
            let lane = bits.trailing_zeros() as usize;
            bits &= bits - 1;
            Some(lane)
        })
    }
}

impl BitOr for LaneSet {
    type Output = LaneSet;

    fn bitor(self, rhs: LaneSet) -> LaneSet {
        LaneSet(self.0 | rhs.0)
    }
}

impl BitAnd for LaneSet {
    type Output = LaneSet;

    fn bitand(self, rhs: LaneSet) -> LaneSet {
        LaneSet(self.0 & rhs.0)
    }
}

impl Not for LaneSet {
    type Output = LaneSet;

    fn not(self) -> LaneSet {
        LaneSet(!self.0)
    }
}

impl FromIterator<usize> for LaneSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut set = LaneSet::empty();
        for lane in iter {
            set.insert(lane);
        }
        set
    }
}

impl fmt::Debug for LaneSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl fmt::Display for LaneSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#b}", self.0)
    }
}

// =============================================================================
// Lane Roles
// =============================================================================

/// Source and target masks for one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneRoles {
    data_shards: usize,
    parity_shards: usize,
    sources: LaneSet,
    targets: LaneSet,
}

impl LaneRoles {
    fn checked(
        data_shards: usize,
        parity_shards: usize,
        sources: LaneSet,
        targets: LaneSet,
    ) -> Self {
        let all = LaneSet::range(0, data_shards + parity_shards);
        assert_eq!(sources.count(), data_shards, "sources must hold exactly k lanes");
        assert!(sources.is_disjoint(targets), "sources and targets overlap");
        assert!(sources.is_subset(all) && targets.is_subset(all), "lane out of range");
        Self {
            data_shards,
            parity_shards,
            sources,
            targets,
        }
    }

    /// Encode: every data lane is a source, every parity lane a target.
    pub fn for_encode(data_shards: usize, parity_shards: usize) -> Self {
        Self::checked(
            data_shards,
            parity_shards,
            LaneSet::range(0, data_shards),
            LaneSet::range(data_shards, data_shards + parity_shards),
        )
    }

    /// Decode role selection.
    ///
    /// Present data lanes are preferred as sources and absent data lanes
    /// become targets; present parity lanes then fill the remaining source
    /// slots in index order. Fails when fewer than k lanes are present.
    pub fn for_decode(data_shards: usize, parity_shards: usize, present: LaneSet) -> Result<Self> {
        let total = data_shards + parity_shards;
        let available = (present & LaneSet::range(0, total)).count();
        if available < data_shards {
            return Err(Error::InsufficientShards {
                available,
                required: data_shards,
            });
        }

        let mut sources = LaneSet::empty();
        let mut targets = LaneSet::empty();
        for lane in 0..data_shards {
            if present.contains(lane) {
                sources.insert(lane);
            } else {
                targets.insert(lane);
            }
        }
        for lane in data_shards..total {
            if sources.count() == data_shards {
                break;
            }
            if present.contains(lane) {
                sources.insert(lane);
            }
        }

        Ok(Self::checked(data_shards, parity_shards, sources, targets))
    }

    /// Repair role selection.
    ///
    /// The first k present input lanes in index order become sources; every
    /// requested output lane that is not a source becomes a target. Source
    /// lanes with a requested output are re-emitted from their input bytes.
    pub fn for_repair(
        data_shards: usize,
        parity_shards: usize,
        present: LaneSet,
        requested: LaneSet,
    ) -> Result<Self> {
        let total = data_shards + parity_shards;
        let present = present & LaneSet::range(0, total);
        if present.count() < data_shards {
            return Err(Error::InsufficientShards {
                available: present.count(),
                required: data_shards,
            });
        }

        let sources: LaneSet = present.iter().take(data_shards).collect();
        let targets = requested & LaneSet::range(0, total) & !sources;

        Ok(Self::checked(data_shards, parity_shards, sources, targets))
    }

    pub fn data_shards(&self) -> usize {
        self.data_shards
    }

    pub fn parity_shards(&self) -> usize {
        self.parity_shards
    }

    /// Lanes feeding the coding primitive
    pub fn sources(&self) -> LaneSet {
        self.sources
    }

    /// Lanes the coding primitive (re)computes
    pub fn targets(&self) -> LaneSet {
        self.targets
    }

    /// Data lanes `[0, k)`
    pub fn data_lanes(&self) -> LaneSet {
        LaneSet::range(0, self.data_shards)
    }

    /// Parity lanes `[k, k + m)`
    pub fn parity_lanes(&self) -> LaneSet {
        LaneSet::range(self.data_shards, self.data_shards + self.parity_shards)
    }
}
