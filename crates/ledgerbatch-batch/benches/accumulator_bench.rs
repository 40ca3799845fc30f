//! ledgerbatch-batch 누적기 성능 벤치마크
//!
//! 실행: cargo bench -p ledgerbatch-batch
//!
//! 벤치마크 대상:
//! - 키 기록 (순차 / 난수 키, 중복 비율별)
//! - 봉인 → 정리 사이클

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ledgerbatch_batch::accumulator::BatchAccumulator;
use ledgerbatch_batch::sequencer::KeySequencer;
use ledgerbatch_core::models::run::{KeyMode, KeyWindow};
use std::hint::black_box;

fn generate_keys(count: i64, mode: KeyMode) -> Vec<String> {
    let window = KeyWindow::new(1, count + 1).unwrap();
    KeySequencer::new("asset", window, mode)
        .with_seed(42)
        .keys()
        .collect()
}

/// 모드별 기록 처리량
fn bench_record(c: &mut Criterion) {
    let mut group = c.benchmark_group("record");

    for count in [100i64, 1_000, 10_000] {
        group.throughput(Throughput::Elements(count as u64));

        for (name, mode) in [("sequential", KeyMode::Sequential), ("random", KeyMode::Random)] {
            let keys = generate_keys(count, mode);
            group.bench_with_input(BenchmarkId::new(name, count), &keys, |b, keys| {
                b.iter(|| {
                    let mut acc = BatchAccumulator::new();
                    for key in keys {
                        black_box(acc.record(key));
                    }
                    acc
                });
            });
        }
    }

    group.finish();
}

/// 25개 단위 봉인 + 정리 (기본 크기 임계값)
fn bench_seal_clear(c: &mut Criterion) {
    let keys = generate_keys(10_000, KeyMode::Random);

    c.bench_function("seal_clear_every_25", |b| {
        b.iter(|| {
            let mut acc = BatchAccumulator::new();
            for key in &keys {
                if acc.record(key) >= 25 {
                    if let Some(snapshot) = acc.seal() {
                        acc.clear(black_box(snapshot).epoch());
                    }
                }
            }
            acc
        });
    });
}

criterion_group!(benches, bench_record, bench_seal_clear);
criterion_main!(benches);
