//! Reed-Solomon Coder Adapter
//!
//! Implements the `StripeCoder` port with the `reed-solomon-erasure` crate
//! (GF(2^8)). Single-parity layouts use plain XOR instead. Coder instances
//! are cached process-wide per (k, m).

use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use reed_solomon_erasure::galois_8::ReedSolomon;
use tracing::debug;

use crate::config::validate_shard_counts;
use crate::domain::ports::StripeCoder;
use crate::ec::LaneSet;
use crate::error::{Error, Result};

// =============================================================================
// Coder Cache
// =============================================================================

static CODERS: Lazy<DashMap<(usize, usize), Arc<dyn StripeCoder>>> = Lazy::new(DashMap::new);

/// Shared coder for `k` data and `m` parity shards.
///
/// The cache is append-only: instances are built on first use and never
/// evicted. When two callers race on a new key the first insert wins and
/// both receive the same instance.
pub fn coder_for(data_shards: usize, parity_shards: usize) -> Result<Arc<dyn StripeCoder>> {
    let key = (data_shards, parity_shards);
    if let Some(coder) = CODERS.get(&key) {
        return Ok(coder.clone());
    }

    let coder: Arc<dyn StripeCoder> = if parity_shards == 1 {
        Arc::new(XorCoder::new(data_shards)?)
    } else {
        Arc::new(ReedSolomonCoder::new(data_shards, parity_shards)?)
    };
    debug!("Created coder for {}+{}", data_shards, parity_shards);

    Ok(CODERS.entry(key).or_insert(coder).clone())
}

/// Check the masks handed to a coder against its shape.
fn check_roles(
    coder: &dyn StripeCoder,
    sources: LaneSet,
    targets: LaneSet,
    data: &[u8],
    parity: &[u8],
    shard_len: usize,
) -> Result<()> {
    let k = coder.data_shards();
    let m = coder.parity_shards();
    let all = LaneSet::range(0, k + m);
    if sources.count() != k || !sources.is_subset(all) || !targets.is_subset(all) {
        return Err(Error::CodingPrimitive(format!(
            "bad lane masks for {}+{}: sources={:?} targets={:?}",
            k, m, sources, targets
        )));
    }
    if !sources.is_disjoint(targets) {
        return Err(Error::CodingPrimitive(format!(
            "sources {:?} overlap targets {:?}",
            sources, targets
        )));
    }
    if shard_len == 0 || data.len() != k * shard_len || parity.len() != m * shard_len {
        return Err(Error::CodingPrimitive(format!(
            "buffer sizes {}/{} do not match {}+{} x {}",
            data.len(),
            parity.len(),
            k,
            m,
            shard_len
        )));
    }
    Ok(())
}

// =============================================================================
// Reed-Solomon Coder
// =============================================================================

/// Reed-Solomon coder over GF(2^8).
pub struct ReedSolomonCoder {
    rs: ReedSolomon,
    data_shards: usize,
    parity_shards: usize,
}

impl std::fmt::Debug for ReedSolomonCoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReedSolomonCoder")
            .field("data_shards", &self.data_shards)
            .field("parity_shards", &self.parity_shards)
            .finish()
    }
}

impl ReedSolomonCoder {
    /// Create a new coder.
    ///
    /// # Arguments
    /// * `data_shards` - Number of data shards (k)
    /// * `parity_shards` - Number of parity shards (m)
    pub fn new(data_shards: usize, parity_shards: usize) -> Result<Self> {
        validate_shard_counts(data_shards, parity_shards)?;
        let rs = ReedSolomon::new(data_shards, parity_shards).map_err(|e| {
            Error::ContractViolation(format!("Failed to create Reed-Solomon codec: {}", e))
        })?;
        Ok(Self {
            rs,
            data_shards,
            parity_shards,
        })
    }

    /// Plain parity computation: all data lanes in, parity lanes out.
    fn encode_parity(&self, data: &mut [u8], parity: &mut [u8], shard_len: usize) -> Result<()> {
        let mut shards: Vec<&mut [u8]> = data
            .chunks_mut(shard_len)
            .chain(parity.chunks_mut(shard_len))
            .collect();
        self.rs
            .encode(&mut shards)
            .map_err(|e| Error::CodingPrimitive(format!("Reed-Solomon encoding failed: {}", e)))
    }

    /// General reconstruction from an arbitrary set of k sources, in place
    /// on the stripe buffers.
    fn reconstruct_targets(
        &self,
        sources: LaneSet,
        targets: LaneSet,
        data: &mut [u8],
        parity: &mut [u8],
        shard_len: usize,
    ) -> Result<()> {
        let mut shards: Vec<(&mut [u8], bool)> = data
            .chunks_mut(shard_len)
            .chain(parity.chunks_mut(shard_len))
            .enumerate()
            .map(|(lane, slice)| (slice, sources.contains(lane)))
            .collect();

        let wants_parity = targets.iter().any(|lane| lane >= self.data_shards);
        let result = if wants_parity {
            self.rs.reconstruct(&mut shards)
        } else {
            self.rs.reconstruct_data(&mut shards)
        };
        result.map_err(|e| {
            Error::CodingPrimitive(format!("Reed-Solomon reconstruction failed: {}", e))
        })
    }
}

impl StripeCoder for ReedSolomonCoder {
    fn data_shards(&self) -> usize {
        self.data_shards
    }

    fn parity_shards(&self) -> usize {
        self.parity_shards
    }

    fn code(
        &self,
        sources: LaneSet,
        targets: LaneSet,
        data: &mut [u8],
        parity: &mut [u8],
        shard_len: usize,
    ) -> Result<()> {
        check_roles(self, sources, targets, data, parity, shard_len)?;
        if targets.is_empty() {
            return Ok(());
        }

        let k = self.data_shards;
        let full_encode = sources == LaneSet::range(0, k)
            && targets == LaneSet::range(k, k + self.parity_shards);
        if full_encode {
            self.encode_parity(data, parity, shard_len)
        } else {
            self.reconstruct_targets(sources, targets, data, parity, shard_len)
        }
    }
}

// =============================================================================
// XOR Coder
// =============================================================================

/// Single-parity coder: the parity lane is the XOR of all data lanes, so any
/// one missing lane is the XOR of the other k.
#[derive(Debug)]
pub struct XorCoder {
    data_shards: usize,
}

impl XorCoder {
    pub fn new(data_shards: usize) -> Result<Self> {
        validate_shard_counts(data_shards, 1)?;
        Ok(Self { data_shards })
    }
}

impl StripeCoder for XorCoder {
    fn data_shards(&self) -> usize {
        self.data_shards
    }

    fn parity_shards(&self) -> usize {
        1
    }

    fn code(
        &self,
        sources: LaneSet,
        targets: LaneSet,
        data: &mut [u8],
        parity: &mut [u8],
        shard_len: usize,
    ) -> Result<()> {
        check_roles(self, sources, targets, data, parity, shard_len)?;
        let Some(target) = targets.iter().next() else {
            return Ok(());
        };

        let mut acc = vec![0u8; shard_len];
        for lane in sources.iter() {
            let slice = if lane < self.data_shards {
                &data[lane * shard_len..(lane + 1) * shard_len]
            } else {
                &parity[..shard_len]
            };
            for (a, b) in acc.iter_mut().zip(slice) {
                *a ^= b;
            }
        }

        let dst = if target < self.data_shards {
            &mut data[target * shard_len..(target + 1) * shard_len]
        } else {
            &mut parity[..shard_len]
        };
        dst.copy_from_slice(&acc);
        Ok(())
    }
}
