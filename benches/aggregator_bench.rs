//! Criterion benchmarks for revenue aggregation

use chrono::{Duration, TimeZone, Utc};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use revtrack::services::Aggregator;
use revtrack::types::{
    Link, Platform, Result, RevenueWindow, Transaction, TransactionKind, TransactionPage,
    WindowLabel,
};
use rust_decimal::Decimal;
use std::hint::black_box;

const CURRENCIES: [&str; 3] = ["USD", "EUR", "GBP"];

fn window() -> RevenueWindow {
    let start = Utc.with_ymd_and_hms(2024, 6, 14, 23, 0, 0).unwrap();
    RevenueWindow {
        start,
        end: start + Duration::days(1) - Duration::nanoseconds(1),
        label: WindowLabel::Today,
    }
}

/// Deterministic synthetic transactions spread across the window
fn transactions(count: usize) -> Vec<Transaction> {
    let start = window().start;
    (0..count)
        .map(|i| Transaction {
            amount: Decimal::new((i as i64 % 5000) + 99, 2),
            currency: CURRENCIES[i % CURRENCIES.len()].to_string(),
            timestamp: Some(start + Duration::seconds((i as i64 * 37) % 86_400)),
            kind: if i % 7 == 0 {
                TransactionKind::Subscription
            } else {
                TransactionKind::Tip
            },
        })
        .collect()
}

fn results(accounts: usize, per_account: usize) -> Vec<(Link, Result<TransactionPage>)> {
    (0..accounts)
        .map(|i| {
            let link = Link::new(-100, Platform::OnlyFans, i.to_string());
            (link, Ok(transactions(per_account).into()))
        })
        .collect()
}

fn bench_summarize(c: &mut Criterion) {
    let aggregator = Aggregator::default();
    let window = window();

    let mut group = c.benchmark_group("summarize");
    for count in [100usize, 500, 5_000] {
        let txs = transactions(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &txs, |b, txs| {
            b.iter(|| aggregator.summarize(Platform::OnlyFans, "1", &window, black_box(txs)));
        });
    }
    group.finish();
}

fn bench_aggregate(c: &mut Criterion) {
    let aggregator = Aggregator::default();

    let mut group = c.benchmark_group("aggregate");
    for accounts in [1usize, 10, 50] {
        group.bench_with_input(
            BenchmarkId::new("accounts", accounts),
            &accounts,
            |b, &accounts| {
                b.iter_batched(
                    || results(accounts, 500),
                    |input| aggregator.aggregate(window(), black_box(input)),
                    criterion::BatchSize::LargeInput,
                );
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_summarize, bench_aggregate);
criterion_main!(benches);
