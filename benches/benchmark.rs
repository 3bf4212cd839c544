//! Benchmarks for pipebuf throughput.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pipebuf::{FileBlock, Message, OptionsBuilder};
use tempfile::TempDir;

fn test_message(i: usize) -> Message {
    Message::from_parts(vec![
        bytes::Bytes::from("hello"),
        bytes::Bytes::from("world"),
        bytes::Bytes::from("12345"),
        bytes::Bytes::from(format!("test{}", i)),
    ])
}

fn open_block(dir: &TempDir, file_size: usize) -> FileBlock {
    FileBlock::open(
        OptionsBuilder::new(dir.path())
            .file_size(file_size)
            .build()
            .unwrap(),
    )
    .unwrap()
}

/// Benchmark sequential pushes.
fn bench_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("push");

    for size in [100, 1000, 10000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter_with_setup(
                || {
                    let dir = TempDir::new().unwrap();
                    let block = open_block(&dir, 64 * 1024 * 1024);
                    (dir, block)
                },
                |(_dir, block)| {
                    for i in 0..size {
                        block.push(test_message(i)).unwrap();
                    }
                    black_box(())
                },
            );
        });
    }

    group.finish();
}

/// Benchmark draining a pre-filled buffer.
fn bench_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("drain");

    for size in [100, 1000, 10000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter_with_setup(
                || {
                    let dir = TempDir::new().unwrap();
                    let block = open_block(&dir, 64 * 1024 * 1024);
                    for i in 0..size {
                        block.push(test_message(i)).unwrap();
                    }
                    (dir, block)
                },
                |(_dir, block)| {
                    for _ in 0..size {
                        let _ = black_box(block.next().unwrap());
                        block.shift().unwrap();
                    }
                },
            );
        });
    }

    group.finish();
}

/// Benchmark push/drain pairs across small segments, forcing rollover
/// and reaping on every few messages.
fn bench_segment_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("segment_churn");

    group.throughput(Throughput::Elements(1000));
    group.bench_function("1000_messages_1k_segments", |b| {
        b.iter_with_setup(
            || {
                let dir = TempDir::new().unwrap();
                let block = open_block(&dir, 1000);
                (dir, block)
            },
            |(_dir, block)| {
                for i in 0..1000 {
                    block.push(test_message(i)).unwrap();
                    let _ = black_box(block.next().unwrap());
                    block.shift().unwrap();
                }
            },
        );
    });

    group.finish();
}

criterion_group!(benches, bench_push, bench_drain, bench_segment_churn);
criterion_main!(benches);
