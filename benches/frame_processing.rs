//! Benchmarks for frame allocation, conversion and pipe transport
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mediaflow_rs::builtin::convert::{RgbSwap, RgbToY8};
use mediaflow_rs::builtin::pattern::paint;
use mediaflow_rs::frame::format::{BGR24, RGB24, YUV420P};
use mediaflow_rs::frame::{FixedMemoryPool, Frame, RawVideoFrame, Resolution};
use mediaflow_rs::pipeline::{CancellationToken, IoFilter, Pipe, PipePolicy};
use std::time::Duration;

const RESOLUTIONS: [(usize, usize); 3] = [(320, 240), (1280, 720), (1920, 1080)];

fn bench_frame_allocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_allocation");
    let pool = FixedMemoryPool::new();

    for (w, h) in RESOLUTIONS {
        let resolution = Resolution::new(w, h);
        let label = format!("{}x{}", w, h);
        group.bench_with_input(BenchmarkId::new("heap", &label), &resolution, |b, &r| {
            b.iter(|| black_box(RawVideoFrame::create_empty_in(YUV420P, r, None)));
        });
        group.bench_with_input(BenchmarkId::new("pool", &label), &resolution, |b, &r| {
            b.iter(|| black_box(RawVideoFrame::create_empty_in(YUV420P, r, Some(&pool))));
        });
    }

    group.finish();
}

fn bench_conversion(c: &mut Criterion) {
    let mut group = c.benchmark_group("conversion");

    for (w, h) in RESOLUTIONS {
        let resolution = Resolution::new(w, h);
        let mut source = RawVideoFrame::create_empty(RGB24, resolution, false).unwrap();
        paint(&mut source, 0);
        let frame: Frame = source.into();
        let label = format!("{}x{}", w, h);

        group.throughput(Throughput::Bytes(frame.size() as u64));
        group.bench_with_input(BenchmarkId::new("rgb_swap", &label), &frame, |b, f| {
            let mut filter = RgbSwap::new(BGR24);
            b.iter(|| black_box(filter.process(f.clone()).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("rgb_to_y8", &label), &frame, |b, f| {
            let mut filter = RgbToY8;
            b.iter(|| black_box(filter.process(f.clone()).unwrap()));
        });
    }

    group.finish();
}

fn bench_pipe_transport(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipe_transport");
    let frame: Frame = RawVideoFrame::create_empty(RGB24, Resolution::new(64, 64), false)
        .unwrap()
        .into();
    let cancel = CancellationToken::new();
    let slice = Duration::from_millis(10);

    let policies = [
        ("blocking", PipePolicy::Blocking { capacity: 64 }),
        ("drop_oldest", PipePolicy::DropOldest { capacity: 64 }),
        ("latest", PipePolicy::Latest),
    ];

    group.throughput(Throughput::Elements(1));
    for (name, policy) in policies {
        let pipe = Pipe::new(name, policy, vec![]);
        let writer = pipe.take_writer().unwrap();
        let reader = pipe.connect_reader();
        group.bench_function(BenchmarkId::new("push_pop", name), |b| {
            b.iter(|| {
                writer.push(frame.clone(), &cancel, slice);
                black_box(reader.pop())
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_frame_allocation,
    bench_conversion,
    bench_pipe_transport,
);

criterion_main!(benches);
