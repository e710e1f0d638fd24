use antifraud_core::{aggregate, run_local_ensemble, Decision, Signal, TransactionCandidate};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn bench_local_ensemble(c: &mut Criterion) {
    let address = "bc1qxy2kgdygjrsqtzq2n0yrf2493p83kkfjhx0wlh";
    let tx = TransactionCandidate::new(address, 0.75, 14.0, "mainnet").expect("valid candidate");
    c.bench_function("local_ensemble_32", |b| {
        b.iter(|| run_local_ensemble(black_box(&tx), black_box(0.7)))
    });
}

fn bench_aggregate(c: &mut Criterion) {
    let signals: Vec<Signal> = (0..64)
        .map(|i| {
            let score = (i % 10) as f64 / 10.0;
            Signal::new(score, Decision::from_score(score, 0.7)).with_weight(1.0 + (i % 3) as f64)
        })
        .collect();
    c.bench_function("aggregate_64_signals", |b| {
        b.iter(|| aggregate(black_box(&signals), black_box(0.7)))
    });
}

criterion_group!(benches, bench_local_ensemble, bench_aggregate);
criterion_main!(benches);
