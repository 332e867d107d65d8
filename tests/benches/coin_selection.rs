//! # Coin Selection Benchmarks
//!
//! | Operation | Expected |
//! |-----------|----------|
//! | Greedy selection over the cache | linear in selected outputs |
//! | Weight estimation | constant per input |
//! | Reorganisation split | linear in outputs |

use std::collections::BTreeMap;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pc_01_utxo_connector::{
    coin_select, create_reorganisation_outputs, OutPoint, TxId, TxWeightEstimator, UnspentInput,
};
use shared_types::Amount;

fn cache(size: usize) -> BTreeMap<OutPoint, UnspentInput> {
    (0..size)
        .map(|i| {
            let mut seed = [0u8; 32];
            seed[..8].copy_from_slice(&(i as u64).to_le_bytes());
            let input = UnspentInput {
                address: format!("wallet-{}", i),
                account: String::new(),
                amount: Amount::from_sat(10_000 + (i as i64 % 97) * 1_000),
                confirmations: 6,
                tx_id: TxId::from_bytes(seed),
                vout: 0,
            };
            (input.outpoint(), input)
        })
        .collect()
}

fn bench_coin_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("coin-select");
    group.measurement_time(Duration::from_secs(5));

    for size in [10usize, 100, 1_000, 10_000] {
        let outputs = cache(size);
        let total: Amount = outputs.values().map(|u| u.amount).sum();
        // Spend about half of the cache.
        let target = Amount::from_sat(total.as_sat() / 2);

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("half_of_cache", size), &outputs, |b, outputs| {
            b.iter(|| black_box(coin_select(20, target, outputs.values()).is_ok()))
        });
    }

    group.finish();
}

fn bench_weight_estimator(c: &mut Criterion) {
    c.bench_function("weight/mixed_100_inputs", |b| {
        b.iter(|| {
            let mut estimator = TxWeightEstimator::new();
            for i in 0..100 {
                if i % 2 == 0 {
                    estimator.add_p2pkh_input();
                } else {
                    estimator.add_p2wkh_input();
                }
            }
            estimator.add_p2wkh_output().add_p2pkh_output();
            black_box(estimator.size())
        })
    });
}

fn bench_reorganisation_split(c: &mut Criterion) {
    let inputs: Vec<UnspentInput> = cache(20).into_values().collect();

    c.bench_function("reorg_split/20_inputs", |b| {
        b.iter(|| {
            black_box(create_reorganisation_outputs(
                20,
                &inputs,
                Amount::from_sat(5_000),
                Amount::from_sat(546),
            ))
        })
    });
}

criterion_group!(
    benches,
    bench_coin_select,
    bench_weight_estimator,
    bench_reorganisation_split
);
criterion_main!(benches);
