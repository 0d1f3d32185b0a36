use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rust_decimal::Decimal;

fn bench_competitor(c: &mut Criterion) {
    let cfg = sim_core::GameConfig::for_difficulty(sim_core::Difficulty::Hard);
    c.bench_function("competitor 10y monthly", |b| {
        b.iter(|| {
            let mut ai = sim_ai::Competitor::new(Decimal::new(100_000, 0), &cfg.competitor);
            let mut rng = sim_econ::SeededRandom::new(42);
            for _ in 0..120 {
                ai.step_month(&mut rng);
            }
            black_box(ai.net_worth())
        })
    });
}

criterion_group!(benches, bench_competitor);
criterion_main!(benches);
