//! Codec and stream benchmark suite.
//!
//! Benchmarks frame encoding, frame decoding and a full stream round trip
//! at different payload sizes.
//!
//! Run with: cargo bench --bench codec
//! Results saved to: target/criterion/

use std::io::Cursor;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use tokio::runtime::Runtime;

use mqtt_stream::{ControlPacket, Publish, Stream, codec};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const PAYLOAD_SIZES: &[usize] = &[16, 1024, 64 * 1024];

/// Frames per stream round trip iteration.
const BATCH: usize = 64;

fn publish(size: usize) -> ControlPacket {
    Publish::new("bench/topic", vec![0xAB; size]).into()
}

// ============================================================================
// Benchmark: Encode
// ============================================================================

fn bench_encode(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("encode");

    for &size in PAYLOAD_SIZES {
        let packet = publish(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("publish", size), &packet, |b, packet| {
            b.to_async(&rt).iter(|| async {
                let mut sink = tokio::io::sink();
                codec::encode(&mut sink, packet).await.unwrap()
            });
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Decode
// ============================================================================

fn bench_decode(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("decode");

    for &size in PAYLOAD_SIZES {
        let bytes = codec::to_vec(&publish(size)).unwrap();
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(BenchmarkId::new("publish", size), &bytes, |b, bytes| {
            b.to_async(&rt).iter(|| async {
                let mut source = bytes.as_slice();
                codec::decode::<ControlPacket, _>(&mut source)
                    .await
                    .unwrap()
                    .unwrap()
            });
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Stream Round Trip
// ============================================================================

fn bench_stream_receive(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("stream_receive");
    group.sample_size(20);

    for &size in PAYLOAD_SIZES {
        let frame = codec::to_vec(&publish(size)).unwrap();
        let bytes = frame.repeat(BATCH);
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(BenchmarkId::new("publish", size), &bytes, |b, bytes| {
            b.to_async(&rt).iter(|| async {
                let stream: Stream = Stream::buffer(Cursor::new(bytes.clone()), tokio::io::sink());
                let mut received = 0;
                while stream.recv().await.is_some() {
                    received += 1;
                }
                assert_eq!(received, BATCH);
            });
        });
    }

    group.finish();
}

// ============================================================================
// Main
// ============================================================================

criterion_group!(benches, bench_encode, bench_decode, bench_stream_receive);
criterion_main!(benches);
