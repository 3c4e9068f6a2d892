//! Parse + classify benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use depwall_dataplane::{parse, DecisionEngine, EngineConfig, FrameBuilder};
use depwall_policy::TableLimits;
use std::net::Ipv4Addr;

const SRC: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
const DST: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);

fn bench_parse(c: &mut Criterion) {
    let frame = FrameBuilder::tcp(SRC, DST, 1234, 80).build();

    c.bench_function("parse_tcp", |b| b.iter(|| parse(black_box(&frame))));
}

fn bench_classify(c: &mut Criterion) {
    let engine = DecisionEngine::default();
    engine.dependencies().add(SRC, DST, true).unwrap();

    let mut group = c.benchmark_group("classify");
    for size in [0usize, 64, 512, 1446].iter() {
        let frame = FrameBuilder::tcp(SRC, DST, 1234, 80).payload(*size).build();
        group.throughput(Throughput::Bytes(frame.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(frame.len()), &frame, |b, frame| {
            b.iter(|| engine.classify(black_box(frame)))
        });
    }
    group.finish();
}

fn bench_classify_with_auth(c: &mut Criterion) {
    let engine = DecisionEngine::with_limits(
        EngineConfig {
            enforce_source_auth: true,
            ..Default::default()
        },
        TableLimits::default(),
    );
    let mac = [0x02, 0, 0, 0, 0, 0x01].into();
    engine.auth().install(mac, SRC).unwrap();

    // Fill the dependency table to its default capacity
    for i in 0..10_000u32 {
        let dst = Ipv4Addr::from(0x0a01_0000 + i);
        engine.dependencies().add(SRC, dst, true).unwrap();
    }
    let frame = FrameBuilder::tcp(SRC, Ipv4Addr::from(0x0a01_0000 + 5_000), 1234, 80)
        .src_mac(mac)
        .build();

    c.bench_function("classify_auth_10k_edges", |b| {
        b.iter(|| engine.classify(black_box(&frame)))
    });
}

fn bench_batch(c: &mut Criterion) {
    let engine = DecisionEngine::default();
    engine.dependencies().add(SRC, DST, true).unwrap();

    let mut group = c.benchmark_group("batch");
    for batch_size in [16u16, 32, 64].iter() {
        let frames: Vec<Vec<u8>> = (0..*batch_size)
            .map(|i| FrameBuilder::udp(SRC, DST, 40_000 + i, 53).build())
            .collect();
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(BenchmarkId::new("classify", batch_size), &frames, |b, frames| {
            b.iter(|| {
                frames
                    .iter()
                    .filter(|f| engine.classify(black_box(f)).is_pass())
                    .count()
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_parse,
    bench_classify,
    bench_classify_with_auth,
    bench_batch,
);

criterion_main!(benches);
