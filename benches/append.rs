use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use tempfile::tempdir;

use logroll::{Roller, RollerConfig};

const APPENDS_PER_ITER: usize = 10_000;

fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("append");
    for &size in &[64_usize, 256, 1024] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter_batched(
                || {
                    let dir = tempdir().expect("tempdir");
                    let config = RollerConfig::new(dir.path().join("bench.log"), 512, 1024);
                    let roller = Roller::new(config).expect("roller");
                    let payload = vec![0u8; size];
                    (dir, roller, payload)
                },
                |(_dir, mut roller, payload)| {
                    for _ in 0..APPENDS_PER_ITER {
                        roller.append(black_box(&payload)).expect("append");
                    }
                    roller.flush().expect("flush");
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_append);
criterion_main!(benches);
