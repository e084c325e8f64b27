//! Performance benchmarks for the ccubench hot paths.
//!
//! Run with: `cargo bench`

use bytes::BytesMut;
use ccubench::codec::part::{decode_part, encode_part};
use ccubench::protocol::{FrameLayout, Phase, StreamReassembler};
use ccubench::report::{LatencySummary, percentile};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

// =============================================================================
// Frame Encoding Benchmarks
// =============================================================================

fn bench_frame_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_encode");

    for size in [64usize, 1024, 16 * 1024] {
        let layout = FrameLayout::new(size);
        let template = layout.template();
        let batch = 32;

        group.throughput(Throughput::Bytes((layout.packet_size() * batch) as u64));
        group.bench_with_input(BenchmarkId::new("batch_32", size), &layout, |b, layout| {
            let mut buf = BytesMut::with_capacity(layout.packet_size() * batch);
            b.iter(|| {
                buf.clear();
                for ts in 0..batch as u64 {
                    layout.encode_into(&mut buf, &template, Phase::Measured, black_box(ts));
                }
                black_box(buf.len())
            })
        });
    }

    let layout = FrameLayout::new(1024);
    let mut packet = BytesMut::new();
    layout.encode_into(&mut packet, &layout.template(), Phase::Measured, 7);
    group.bench_function("decode_1kb", |b| b.iter(|| layout.decode(black_box(&packet))));

    group.finish();
}

// =============================================================================
// Reassembly Benchmarks
// =============================================================================

fn bench_reassembly(c: &mut Criterion) {
    let mut group = c.benchmark_group("reassembly");

    let layout = FrameLayout::new(1024);
    let template = layout.template();
    let mut stream = BytesMut::new();
    for ts in 0..64 {
        layout.encode_into(&mut stream, &template, Phase::Measured, ts);
    }
    group.throughput(Throughput::Bytes(stream.len() as u64));

    // Reads that never line up with frame boundaries
    for chunk in [1500usize, 4096, 65536] {
        group.bench_with_input(BenchmarkId::new("stream", chunk), &chunk, |b, &chunk| {
            let mut reassembler = StreamReassembler::new(layout.packet_size());
            b.iter(|| {
                let mut frames = 0usize;
                for piece in stream.chunks(chunk) {
                    frames += reassembler.push(black_box(piece), |p| {
                        black_box(p);
                    });
                }
                frames
            })
        });
    }

    let mut wire = BytesMut::new();
    encode_part(&mut wire, b"rid-0", true);
    encode_part(&mut wire, &stream, false);
    group.bench_function("message_parts", |b| {
        b.iter(|| {
            let mut inbound = wire.clone();
            let mut parts = 0usize;
            while let Ok(Some(part)) = decode_part(&mut inbound) {
                parts += black_box(part.data.len());
            }
            parts
        })
    });

    group.finish();
}

// =============================================================================
// Percentile Benchmarks
// =============================================================================

fn bench_percentile(c: &mut Criterion) {
    let mut group = c.benchmark_group("percentile");

    for n in [1_000usize, 100_000] {
        let samples: Vec<f64> = (0..n).map(|i| ((i * 7919) % n) as f64).collect();
        group.bench_with_input(BenchmarkId::new("p99", n), &samples, |b, samples| {
            b.iter(|| percentile(black_box(samples), 0.99))
        });
        group.bench_with_input(BenchmarkId::new("summary", n), &samples, |b, samples| {
            b.iter(|| LatencySummary::from_samples(black_box(samples.clone())))
        });
    }

    group.finish();
}

// =============================================================================
// Criterion Setup
// =============================================================================

criterion_group!(benches, bench_frame_encode, bench_reassembly, bench_percentile);

criterion_main!(benches);
