//! Framing benchmarks
//!
//! Measures frame encoding, buffer decoding and a writer/reader pair over an
//! in-process stream.
//!
//! Run with: `cargo bench --bench framing`

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use proxima_core::frame::{
    DEFAULT_MAX_MESSAGE_SIZE, MessageReader, MessageWriter, decode_frame, encode_frame,
};

const SIZES: [usize; 4] = [16, 256, 4096, 65536];

fn message(size: usize) -> String {
    "é".repeat(size / 2)
}

/// Benchmark building one frame
fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_encode");

    for size in SIZES {
        let text = message(size);
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &text, |b, text| {
            b.iter(|| black_box(encode_frame(black_box(text))));
        });
    }

    group.finish();
}

/// Benchmark decoding one frame from a buffer
fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_decode");

    for size in SIZES {
        let frame = encode_frame(&message(size)).unwrap();
        group.throughput(Throughput::Bytes(frame.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &frame, |b, frame| {
            b.iter(|| black_box(decode_frame(black_box(frame), DEFAULT_MAX_MESSAGE_SIZE)));
        });
    }

    group.finish();
}

/// Benchmark a burst of messages through writer and reader
fn bench_stream(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_stream");
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let burst = 64;

    for size in SIZES {
        let text = message(size);
        group.throughput(Throughput::Bytes((text.len() * burst) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &text, |b, text| {
            b.iter(|| {
                rt.block_on(async {
                    let (local, remote) = tokio::io::duplex(64 * 1024);
                    let text = text.clone();
                    let writer = tokio::spawn(async move {
                        let mut writer = MessageWriter::new(local);
                        for _ in 0..burst {
                            writer.write_message(&text).await.unwrap();
                        }
                    });

                    let mut reader = MessageReader::new(remote);
                    for _ in 0..burst {
                        black_box(reader.read_message().await.unwrap());
                    }
                    writer.await.unwrap();
                });
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode, bench_stream);
criterion_main!(benches);
