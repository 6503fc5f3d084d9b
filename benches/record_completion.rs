use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use funnel::test_utils::make_running_aggregator;

const THREAD_STEPS: [usize; 6] = [1, 2, 4, 8, 16, 32];
const ITERATIONS: usize = 10_000;

pub fn contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_completion(): contended");
    for threads in THREAD_STEPS {
        group.throughput(Throughput::Elements(ITERATIONS as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{threads} threads")),
            &threads,
            |b, &threads| {
                b.iter(|| {
                    let aggregator = make_running_aggregator(ITERATIONS);

                    std::thread::scope(|s| {
                        for _ in 0..threads {
                            s.spawn(|| {
                                for _ in 0..(ITERATIONS / threads) {
                                    black_box(aggregator.record_completion());
                                }
                            });
                        }
                    });

                    black_box(aggregator.percentage())
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, contended);
criterion_main!(benches);
