//! Property-Based Tests for the Stripe Pipelines
//!
//! Uses proptest to verify the streaming encode/decode/repair drivers
//! across shard layouts, object sizes, stripe hints and loss patterns.
//!
//! # Test Properties
//!
//! 1. **Roundtrip Correctness**: decode(encode(data)) = data
//! 2. **Fault Tolerance**: any m lost shards are tolerated
//! 3. **Repair Fidelity**: repaired shards equal the originals byte for byte
//! 4. **Determinism**: the same input always produces the same shards
//! 5. **Geometry**: stripe sizes are aligned and within the ceiling

#![cfg(test)]

use bytes::Bytes;
use proptest::prelude::*;

use super::{safe_stripe_size, safe_stripe_size_with_ceiling, Pipeline};
use crate::adapters::{MemorySink, MemorySource};
use crate::config::STRIPE_ALIGNMENT;
use crate::domain::ports::{BoxSink, BoxSource};
use crate::error::Result;

// =============================================================================
// Property Strategies
// =============================================================================

/// Small k+m layouts keep each case fast.
fn small_ec_config_strategy() -> impl Strategy<Value = (usize, usize)> {
    (1usize..=6, 1usize..=3)
}

fn data_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..3000)
}

/// Aligned hints up to a few KiB; 0 selects the configured default.
fn hint_strategy() -> impl Strategy<Value = u32> {
    (0u32..=64).prop_map(|units| units * STRIPE_ALIGNMENT as u32)
}

/// Strategy for the lanes to lose: sorted, unique, at most `max_erasures`.
fn erasure_strategy(total_shards: usize, max_erasures: usize) -> impl Strategy<Value = Vec<usize>> {
    let max = std::cmp::min(max_erasures, total_shards);
    prop::collection::vec(0..total_shards, 0..=max).prop_map(|mut v| {
        v.sort();
        v.dedup();
        v
    })
}

// =============================================================================
// Helpers
// =============================================================================

fn block_on<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("test runtime")
        .block_on(future)
}

async fn encode_shards(data: &[u8], k: usize, m: usize, hint: u32) -> Result<Vec<Bytes>> {
    let sinks: Vec<MemorySink> = (0..k + m).map(|_| MemorySink::new()).collect();
    let mut boxed = sinks.iter().map(|s| Box::new(s.clone()) as BoxSink);
    let data_outputs: Vec<BoxSink> = boxed.by_ref().take(k).collect();
    let parity_outputs: Vec<BoxSink> = boxed.collect();

    Pipeline::default()
        .encode(
            MemorySource::new(data.to_vec()),
            data.len() as u64,
            data_outputs,
            parity_outputs,
            hint,
        )?
        .wait()
        .await?;
    Ok(sinks.iter().map(|s| s.contents()).collect())
}

fn surviving(shards: &[Bytes], lost: &[usize]) -> Vec<Option<BoxSource>> {
    shards
        .iter()
        .enumerate()
        .map(|(lane, bytes)| {
            if lost.contains(&lane) {
                None
            } else {
                Some(Box::new(MemorySource::new(bytes.clone())) as BoxSource)
            }
        })
        .collect()
}

async fn decode_shards(shards: &[Bytes], k: usize, lost: &[usize], size: u64, hint: u32) -> Result<Bytes> {
    let mut data_inputs = surviving(shards, lost);
    let parity_inputs = data_inputs.split_off(k);
    let sink = MemorySink::new();
    Pipeline::default()
        .decode(sink.clone(), size, data_inputs, parity_inputs, hint)?
        .wait()
        .await?;
    Ok(sink.contents())
}

// =============================================================================
// Roundtrip Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: decoding every shard reproduces the object.
    #[test]
    fn prop_roundtrip_no_loss(
        (k, m) in small_ec_config_strategy(),
        data in data_strategy(),
        hint in hint_strategy(),
    ) {
        let decoded = block_on(async {
            let shards = encode_shards(&data, k, m, hint).await?;
            decode_shards(&shards, k, &[], data.len() as u64, hint).await
        })?;
        prop_assert_eq!(&decoded[..], &data[..]);
    }

    /// Property: every shard is a whole number of stripes long.
    #[test]
    fn prop_shard_lengths(
        (k, m) in small_ec_config_strategy(),
        data in data_strategy(),
        hint in hint_strategy(),
    ) {
        let shards = block_on(encode_shards(&data, k, m, hint))?;
        let stripe = Pipeline::default().stripe_size(k, m, hint) as usize;
        let stripes = data.len().div_ceil(k * stripe);
        for shard in &shards {
            prop_assert_eq!(shard.len(), stripes * stripe);
        }
    }

    /// Property: encoding is deterministic.
    #[test]
    fn prop_encode_deterministic(
        (k, m) in small_ec_config_strategy(),
        data in data_strategy(),
    ) {
        let (first, second) = block_on(async {
            let first = encode_shards(&data, k, m, 64).await?;
            let second = encode_shards(&data, k, m, 64).await?;
            Ok::<_, crate::Error>((first, second))
        })?;
        prop_assert_eq!(first, second);
    }
}

// =============================================================================
// Fault Tolerance Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: any pattern of at most m lost shards decodes correctly.
    #[test]
    fn prop_decode_with_losses(
        ((k, m), lost) in small_ec_config_strategy()
            .prop_flat_map(|(k, m)| (Just((k, m)), erasure_strategy(k + m, m))),
        data in data_strategy(),
        hint in hint_strategy(),
    ) {
        let decoded = block_on(async {
            let shards = encode_shards(&data, k, m, hint).await?;
            decode_shards(&shards, k, &lost, data.len() as u64, hint).await
        })?;
        prop_assert_eq!(&decoded[..], &data[..]);
    }

    /// Property: repairing the lost shards reproduces them exactly.
    #[test]
    fn prop_repair_regenerates_lost(
        ((k, m), lost) in small_ec_config_strategy()
            .prop_flat_map(|(k, m)| (Just((k, m)), erasure_strategy(k + m, m))),
        data in data_strategy(),
    ) {
        let (shards, repaired) = block_on(async {
            let shards = encode_shards(&data, k, m, 32).await?;
            let outputs: Vec<MemorySink> = (0..k + m).map(|_| MemorySink::new()).collect();
            let sinks: Vec<Option<BoxSink>> = (0..k + m)
                .map(|lane| {
                    lost.contains(&lane)
                        .then(|| Box::new(outputs[lane].clone()) as BoxSink)
                })
                .collect();
            Pipeline::default()
                .repair(k, m, surviving(&shards, &lost), sinks, data.len() as u64, 32)?
                .wait()
                .await?;
            Ok::<_, crate::Error>((shards, outputs))
        })?;

        for &lane in &lost {
            prop_assert_eq!(&repaired[lane].contents(), &shards[lane]);
        }
    }

    /// Property: losing more than m shards is reported, not mis-decoded.
    #[test]
    fn prop_too_many_losses_rejected(
        (k, m) in small_ec_config_strategy(),
        data in prop::collection::vec(any::<u8>(), 1..500),
    ) {
        let lost: Vec<usize> = (0..=m).collect();
        let result = block_on(async {
            let shards = encode_shards(&data, k, m, 16).await?;
            decode_shards(&shards, k, &lost, data.len() as u64, 16).await
        });
        let is_insufficient = matches!(result, Err(crate::Error::InsufficientShards { .. }));
        prop_assert!(is_insufficient);
    }
}

// =============================================================================
// Geometry Properties
// =============================================================================

proptest! {
    /// Property: stripe sizes are aligned and never exceed the ceiling.
    #[test]
    fn prop_stripe_size_bounds(
        k in 1usize..=32,
        m in 1usize..=32,
        hint in any::<u32>(),
        ceiling in 256usize..=(1 << 31),
    ) {
        let s = safe_stripe_size_with_ceiling(k, m, hint, ceiling) as usize;
        prop_assert_eq!(s % STRIPE_ALIGNMENT, 0);
        prop_assert!(s >= STRIPE_ALIGNMENT);
        prop_assert!(k.max(m) * s <= ceiling);
    }

    /// Property: small aligned hints pass through unchanged.
    #[test]
    fn prop_small_aligned_hint_unchanged(
        k in 1usize..=32,
        m in 1usize..=32,
        units in 1u32..=4096,
    ) {
        let hint = units * STRIPE_ALIGNMENT as u32;
        prop_assert_eq!(safe_stripe_size(k, m, hint), hint);
    }
}
