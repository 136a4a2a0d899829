//! Latency benchmarks for the decision hot path.
//!
//! Run with: `cargo bench --bench latency`

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use polymarket_core::config::RiskConfig;
use polymarket_core::types::{MarketSnapshot, OrderSide, PositionSide};
use risk_manager::RiskManager;
use rust_decimal::Decimal;
use std::sync::Arc;
use trading_engine::engine::{limit_price, order_shares};
use trading_engine::{CostModel, PositionLedger};

fn snapshot(market_id: &str) -> MarketSnapshot {
    MarketSnapshot::new(market_id, "BTC", "tok-up", Decimal::new(48, 2), Decimal::new(52, 2))
        .with_depth(Decimal::new(500, 0), Decimal::new(2500, 0))
        .with_volatility(Decimal::new(2, 2), Decimal::new(15, 4))
}

/// Benchmark the cost model for several order sizes.
fn bench_cost_model(c: &mut Criterion) {
    let mut group = c.benchmark_group("cost_model");
    let model = CostModel::default();
    let snap = snapshot("m1");

    for size in [10i64, 100, 1000, 10000].iter() {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("estimate_for", size), size, |b, size| {
            let shares = Decimal::new(*size, 0);
            b.iter(|| black_box(model.estimate_for(black_box(&snap), black_box(shares))))
        });
    }

    group.finish();
}

/// Benchmark limit pricing and share sizing.
fn bench_order_pricing(c: &mut Criterion) {
    let mut group = c.benchmark_group("order_pricing");
    let snap = snapshot("m1");
    let fraction = Decimal::new(3, 1);
    let tick = Decimal::new(1, 3);
    let step = Decimal::new(1, 2);

    group.bench_function("limit_price_buy", |b| {
        b.iter(|| black_box(limit_price(black_box(&snap), OrderSide::Buy, fraction, tick)))
    });

    group.bench_function("order_shares", |b| {
        let limit = limit_price(&snap, OrderSide::Sell, fraction, tick);
        b.iter(|| black_box(order_shares(black_box(Decimal::new(100, 0)), limit, step)))
    });

    group.finish();
}

/// Benchmark a full ledger round trip.
fn bench_ledger(c: &mut Criterion) {
    let mut group = c.benchmark_group("ledger");
    let ledger = PositionLedger::new();

    group.bench_function("open_close", |b| {
        b.iter(|| {
            let now = Utc::now();
            let _ = ledger.open(
                "m1",
                "BTC",
                PositionSide::Up,
                Decimal::new(100, 0),
                Decimal::new(5, 1),
                now,
            );
            black_box(ledger.close("m1", Decimal::new(55, 2), now))
        })
    });

    for open in [10usize, 100, 1000].iter() {
        let ledger = PositionLedger::new();
        for i in 0..*open {
            let _ = ledger.open(
                &format!("m{}", i),
                "BTC",
                PositionSide::Down,
                Decimal::new(10, 0),
                Decimal::new(5, 1),
                Utc::now(),
            );
        }
        group.bench_with_input(BenchmarkId::new("total_exposure", open), &ledger, |b, ledger| {
            b.iter(|| black_box(ledger.total_exposure()))
        });
    }

    group.finish();
}

/// Benchmark the admission check with a populated ledger.
fn bench_admission(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("admission");

    let ledger = Arc::new(PositionLedger::new());
    for i in 0..20 {
        let _ = ledger.open(
            &format!("m{}", i),
            "ETH",
            PositionSide::Up,
            Decimal::new(50, 0),
            Decimal::new(5, 1),
            Utc::now(),
        );
    }
    let risk = RiskManager::new(ledger, &RiskConfig::default());

    group.bench_function("can_trade_allowed", |b| {
        b.iter(|| black_box(rt.block_on(risk.can_trade("m-new", Decimal::new(100, 0)))))
    });

    group.bench_function("can_trade_denied", |b| {
        b.iter(|| black_box(rt.block_on(risk.can_trade("m-new", Decimal::new(100000, 0)))))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_cost_model,
    bench_order_pricing,
    bench_ledger,
    bench_admission,
);

criterion_main!(benches);
