//! EC Integration Tests
//!
//! End-to-end tests for the streaming encode, decode and repair pipelines.

use std::io::Cursor;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncReadExt;

use stripeflow::adapters::{pipe, MemorySink, MemorySource, ReaderSource, WriterSink};
use stripeflow::ec::{self, LaneSet, Pipeline};
use stripeflow::{BoxSink, BoxSource, Error, PipelineConfig};

// =============================================================================
// Helpers
// =============================================================================

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn object(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 131 + 7) % 256) as u8).collect()
}

fn memory_sinks(n: usize) -> (Vec<MemorySink>, Vec<BoxSink>) {
    let sinks: Vec<MemorySink> = (0..n).map(|_| MemorySink::new()).collect();
    let boxed = sinks.iter().map(|s| Box::new(s.clone()) as BoxSink).collect();
    (sinks, boxed)
}

async fn encode_to_memory(data: &[u8], k: usize, m: usize, hint: u32) -> Vec<Bytes> {
    let (data_sinks, data_boxed) = memory_sinks(k);
    let (parity_sinks, parity_boxed) = memory_sinks(m);
    ec::encode(
        MemorySource::new(data.to_vec()),
        data.len() as u64,
        data_boxed,
        parity_boxed,
        hint,
    )
    .expect("Failed to start encode")
    .wait()
    .await
    .expect("Encode failed");
    data_sinks
        .iter()
        .chain(parity_sinks.iter())
        .map(|s| s.contents())
        .collect()
}

fn sources(shards: &[Bytes], withheld: &[usize]) -> Vec<Option<BoxSource>> {
    shards
        .iter()
        .enumerate()
        .map(|(lane, bytes)| {
            if withheld.contains(&lane) {
                None
            } else {
                Some(Box::new(MemorySource::new(bytes.clone())) as BoxSource)
            }
        })
        .collect()
}

async fn decode_from_memory(shards: &[Bytes], k: usize, withheld: &[usize], size: u64, hint: u32) -> Bytes {
    let mut data_inputs = sources(shards, withheld);
    let parity_inputs = data_inputs.split_off(k);
    let sink = MemorySink::new();
    ec::decode(sink.clone(), size, data_inputs, parity_inputs, hint)
        .expect("Failed to start decode")
        .wait()
        .await
        .expect("Decode failed");
    assert_eq!(sink.finish_count(), 1);
    sink.contents()
}

// =============================================================================
// Encode/Decode Scenarios
// =============================================================================

#[tokio::test]
async fn test_encode_partial_stripe_with_xor_parity() {
    init_tracing();
    let mut input = vec![0x01u8; 512];
    input.extend_from_slice(&[0x02u8; 511]);

    let shards = encode_to_memory(&input, 2, 1, 512).await;
    assert_eq!(&shards[0][..], &[0x01u8; 512][..]);

    let mut lane1 = vec![0x02u8; 511];
    lane1.push(0x00);
    assert_eq!(&shards[1][..], &lane1[..]);

    let parity: Vec<u8> = shards[0].iter().zip(shards[1].iter()).map(|(a, b)| a ^ b).collect();
    assert_eq!(&shards[2][..], &parity[..]);
}

#[tokio::test]
async fn test_decode_with_one_data_and_one_parity_withheld() {
    init_tracing();
    let input = object(100_000);
    let shards = encode_to_memory(&input, 4, 2, 4096).await;

    let decoded = decode_from_memory(&shards, 4, &[2, 4], input.len() as u64, 4096).await;
    assert_eq!(&decoded[..], &input[..]);
}

#[tokio::test]
async fn test_decode_with_too_few_lanes() {
    init_tracing();
    let input = object(10_000);
    let shards = encode_to_memory(&input, 4, 2, 1024).await;

    let mut data_inputs = sources(&shards, &[0, 3, 5]);
    let parity_inputs = data_inputs.split_off(4);
    let sink = MemorySink::new();
    let handle = ec::decode(sink.clone(), input.len() as u64, data_inputs, parity_inputs, 1024)
        .expect("Failed to start decode");

    let reported = handle.error().expect("error should be reported immediately");
    assert!(reported.to_string().contains("3 < 4"));

    let err = handle.wait().await.expect_err("decode should fail");
    assert_eq!(
        err,
        Error::InsufficientShards {
            available: 3,
            required: 4
        }
    );
    assert!(sink.contents().is_empty());
    assert_eq!(sink.errors().len(), 1);
}

#[tokio::test]
async fn test_repair_then_decode_with_different_losses() {
    init_tracing();
    let input = object(250_000);
    let shards = encode_to_memory(&input, 9, 3, 2048).await;

    // lose three lanes and repair them
    let lost = [1usize, 6, 10];
    let repaired: Vec<MemorySink> = (0..12).map(|_| MemorySink::new()).collect();
    let outputs: Vec<Option<BoxSink>> = (0..12)
        .map(|lane| lost.contains(&lane).then(|| Box::new(repaired[lane].clone()) as BoxSink))
        .collect();
    let handle = ec::repair(9, 3, sources(&shards, &lost), outputs, input.len() as u64, 2048)
        .expect("Failed to start repair");
    assert_eq!(handle.targets(), LaneSet::from_iter(lost));
    handle.wait().await.expect("Repair failed");

    let mut rebuilt = shards.clone();
    for &lane in &lost {
        assert_eq!(repaired[lane].contents(), shards[lane]);
        rebuilt[lane] = repaired[lane].contents();
    }

    // decode from the repaired set, withholding three other lanes
    let decoded = decode_from_memory(&rebuilt, 9, &[0, 4, 11], input.len() as u64, 2048).await;
    assert_eq!(&decoded[..], &input[..]);
}

#[tokio::test]
async fn test_empty_object_roundtrip() {
    let shards = encode_to_memory(&[], 3, 2, 64).await;
    assert!(shards.iter().all(|s| s.is_empty()));
    let decoded = decode_from_memory(&shards, 3, &[1, 3], 0, 64).await;
    assert!(decoded.is_empty());
}

// =============================================================================
// Streaming Tests
// =============================================================================

#[tokio::test]
async fn test_encode_piped_into_concurrent_decode() {
    init_tracing();
    let input = object(200_000);
    let withheld = [2usize, 4];

    let mut data_outputs = Vec::new();
    let mut parity_outputs = Vec::new();
    let mut inputs: Vec<Option<BoxSource>> = Vec::new();
    for lane in 0..6 {
        let sink: BoxSink = if withheld.contains(&lane) {
            inputs.push(None);
            Box::new(MemorySink::new())
        } else {
            let (sink, source) = pipe(2);
            inputs.push(Some(Box::new(source)));
            Box::new(sink)
        };
        if lane < 4 {
            data_outputs.push(sink);
        } else {
            parity_outputs.push(sink);
        }
    }
    let parity_inputs = inputs.split_off(4);

    let output = MemorySink::new();
    let encode = ec::encode(
        MemorySource::new(input.clone()),
        input.len() as u64,
        data_outputs,
        parity_outputs,
        4096,
    )
    .expect("Failed to start encode");
    let decode = ec::decode(output.clone(), input.len() as u64, inputs, parity_inputs, 4096)
        .expect("Failed to start decode");

    let (encoded, decoded) = tokio::join!(encode.wait(), decode.wait());
    let encoded = encoded.expect("Encode failed");
    decoded.expect("Decode failed");

    assert_eq!(encoded.stripes, 13);
    assert_eq!(&output.contents()[..], &input[..]);
}

#[tokio::test]
async fn test_slow_outputs_bound_resident_stripes() {
    init_tracing();
    let input = object(64 * 4 * 20);
    let sinks: Vec<MemorySink> = (0..6)
        .map(|_| MemorySink::new().with_delay(Duration::from_millis(2)))
        .collect();
    let mut boxed = sinks.iter().map(|s| Box::new(s.clone()) as BoxSink);
    let data: Vec<BoxSink> = boxed.by_ref().take(4).collect();
    let parity: Vec<BoxSink> = boxed.collect();

    let report = ec::encode(MemorySource::new(input.clone()), input.len() as u64, data, parity, 64)
        .expect("Failed to start encode")
        .wait()
        .await
        .expect("Encode failed");

    assert_eq!(report.stripes, 20);
    assert!(report.peak_resident_stripes <= 2, "peak was {}", report.peak_resident_stripes);
    for sink in &sinks {
        assert_eq!(sink.write_count(), 20);
        assert_eq!(sink.contents().len(), 64 * 20);
    }
}

#[tokio::test]
async fn test_slow_input_keeps_order() {
    let input = object(5_000);
    let (sinks, boxed) = memory_sinks(3);
    let mut boxed = boxed.into_iter();
    let data: Vec<BoxSink> = boxed.by_ref().take(2).collect();
    let parity: Vec<BoxSink> = boxed.collect();

    let source = MemorySource::new(input.clone()).with_delay(Duration::from_millis(1));
    ec::encode(source, input.len() as u64, data, parity, 256)
        .expect("Failed to start encode")
        .wait()
        .await
        .expect("Encode failed");

    let shards: Vec<Bytes> = sinks.iter().map(|s| s.contents()).collect();
    let decoded = decode_from_memory(&shards, 2, &[0], input.len() as u64, 256).await;
    assert_eq!(&decoded[..], &input[..]);
}

#[tokio::test]
async fn test_tokio_io_adapters() {
    init_tracing();
    let input = object(30_000);

    let mut data_outputs = Vec::new();
    let mut readers = Vec::new();
    for _ in 0..3 {
        let (writer, mut reader) = tokio::io::duplex(1024);
        data_outputs.push(Box::new(WriterSink::new(writer)) as BoxSink);
        readers.push(tokio::spawn(async move {
            let mut buf = Vec::new();
            reader.read_to_end(&mut buf).await.map(|_| buf)
        }));
    }
    let parity = MemorySink::new();

    let config = PipelineConfig {
        offload_coding: false,
        ..Default::default()
    };
    Pipeline::new(config)
        .expect("valid config")
        .encode(
            ReaderSource::new(Cursor::new(input.clone())),
            input.len() as u64,
            data_outputs,
            vec![Box::new(parity.clone())],
            1024,
        )
        .expect("Failed to start encode")
        .wait()
        .await
        .expect("Encode failed");

    let mut shards = Vec::new();
    for reader in readers {
        let bytes = reader.await.expect("reader task").expect("read shard");
        shards.push(Bytes::from(bytes));
    }
    shards.push(parity.contents());

    let decoded = decode_from_memory(&shards, 3, &[1], input.len() as u64, 1024).await;
    assert_eq!(&decoded[..], &input[..]);
}

// =============================================================================
// Error Propagation Tests
// =============================================================================

#[tokio::test]
async fn test_failing_outputs_abort_each_lane_at_most_once() {
    init_tracing();
    let healthy: Vec<MemorySink> = (0..4).map(|_| MemorySink::new()).collect();
    let failing = [
        MemorySink::new().failing("disk full"),
        MemorySink::new().failing("disk gone"),
    ];
    let data: Vec<BoxSink> = healthy.iter().map(|s| Box::new(s.clone()) as BoxSink).collect();
    let parity: Vec<BoxSink> = failing.iter().map(|s| Box::new(s.clone()) as BoxSink).collect();

    let input = object(4096);
    let err = ec::encode(MemorySource::new(input), 4096, data, parity, 128)
        .expect("Failed to start encode")
        .wait()
        .await
        .expect_err("encode should fail");
    assert!(matches!(err, Error::Downstream { lane: Some(4 | 5), .. }));

    for sink in &healthy {
        assert_eq!(sink.errors(), vec![err.to_string()]);
        assert_eq!(sink.finish_count(), 0);
    }
    for sink in &failing {
        assert!(sink.errors().len() <= 1);
        assert_eq!(sink.finish_count(), 0);
    }
}

#[tokio::test]
async fn test_failing_input_reaches_decode_output() {
    init_tracing();
    let input = object(8192);
    let shards = encode_to_memory(&input, 4, 2, 256).await;

    let mut data_inputs = sources(&shards, &[]);
    data_inputs[1] = Some(Box::new(MemorySource::new(shards[1].clone()).fail_after(600, "connection reset")));
    let parity_inputs = data_inputs.split_off(4);

    let sink = MemorySink::new();
    let err = ec::decode(sink.clone(), input.len() as u64, data_inputs, parity_inputs, 256)
        .expect("Failed to start decode")
        .wait()
        .await
        .expect_err("decode should fail");
    assert!(matches!(err, Error::Upstream { lane: Some(1), .. }));
    assert_eq!(sink.errors(), vec![err.to_string()]);
    assert_eq!(sink.finish_count(), 0);
}

#[tokio::test]
async fn test_contract_violations_are_synchronous() {
    let (_, data) = memory_sinks(4);
    let (_, parity) = memory_sinks(2);
    let result = ec::encode(MemorySource::new(vec![0u8; 8]), 8, data, parity, 100);
    assert!(matches!(result, Err(Error::ContractViolation(_))));

    let (_, parity) = memory_sinks(33);
    let (_, data) = memory_sinks(4);
    let result = ec::encode(MemorySource::new(vec![0u8; 8]), 8, data, parity, 64);
    assert!(matches!(result, Err(Error::ContractViolation(_))));

    let result = ec::repair(4, 2, Vec::new(), Vec::new(), 8, 64);
    assert!(matches!(result, Err(Error::ContractViolation(_))));
}

#[test]
fn test_safe_stripe_size() {
    assert_eq!(ec::safe_stripe_size(4, 2, 1000), 1000);
    assert_eq!(ec::safe_stripe_size(4, 2, 1001), 1008);
    assert_eq!(ec::safe_stripe_size(4, 2, 0), 8);
    let capped = ec::safe_stripe_size(32, 4, u32::MAX) as u64;
    assert_eq!(capped % 8, 0);
    assert!(32 * capped <= (1u64 << 31) - 1);
}
