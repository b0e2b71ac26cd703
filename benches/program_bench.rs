use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;

use stacklang::vm::{run, run_with_tracer, EventLog, VMOptions};
use stacklang::StackLang;

const COUNTDOWN: &str = "/count { /n exch def { 0 n < } { n 1 - count } { } if } def";

fn program(n: u32) -> String {
    format!("{COUNTDOWN}\n{n} count")
}

fn options() -> VMOptions {
    VMOptions::new(1 << 20, 1_000, u64::MAX)
}

fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("countdown");
    for n in [10, 100, 400] {
        let source = program(n);
        group.bench_function(BenchmarkId::new("run", n), |bencher| {
            bencher.iter(|| black_box(run(black_box(&source), options()).unwrap()));
        });
        group.bench_function(BenchmarkId::new("event_log", n), |bencher| {
            bencher.iter(|| black_box(run_with_tracer(black_box(&source), options(), EventLog::default()).unwrap()));
        });
        group.bench_function(BenchmarkId::new("driver", n), |bencher| {
            bencher.iter(|| StackLang::with_options(black_box(&source), options()).count());
        });
    }
    group.finish();
}

criterion_group!(name = benches; config = Criterion::default(); targets = criterion_benchmark);
criterion_main!(benches);
