use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chrono::{Duration, Utc};
use stockroom_events::ActivityFilter;
use stockroom_infra::{InMemoryLedgerStore, ReconciliationEngine};
use stockroom_inventory::{Item, ItemKind, RegisterItem};
use stockroom_lending::{Checkout, CheckoutLine, ReturnItems, ReturnLine, TransactionKind};

type Engine = ReconciliationEngine<InMemoryLedgerStore>;

fn setup(stock: u32) -> (Engine, Item) {
    let engine = ReconciliationEngine::new(InMemoryLedgerStore::new());
    let item = engine
        .register_item(&RegisterItem {
            name: "Drill".to_string(),
            kind: ItemKind::Tool,
            initial_stock: stock,
            min_stock: 0,
            unit: None,
            location: None,
            occurred_at: Utc::now(),
        })
        .unwrap();
    (engine, item)
}

fn borrow(item: &Item, quantity: u32) -> Checkout {
    let now = Utc::now();
    Checkout {
        requester_name: "Bench".to_string(),
        purpose: "benchmark".to_string(),
        kind: TransactionKind::Borrowing,
        expected_return_date: Some(now + Duration::days(1)),
        notes: None,
        lines: vec![CheckoutLine {
            item_id: item.id_typed(),
            quantity,
        }],
        occurred_at: now,
    }
}

fn bench_checkout_return_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("checkout_return_cycle");
    group.sample_size(1000);

    group.bench_function("checkout_then_full_return", |b| {
        let (engine, item) = setup(10);
        b.iter(|| {
            let txn = engine.checkout(&borrow(&item, black_box(2))).unwrap();
            let returned = engine
                .return_items(&ReturnItems {
                    transaction_id: txn.id_typed(),
                    lines: vec![ReturnLine {
                        line_id: txn.lines()[0].id,
                        returned: 2,
                        damaged: 0,
                        lost: 0,
                        condition: None,
                        notes: None,
                    }],
                    notes: None,
                    occurred_at: Utc::now(),
                })
                .unwrap();
            black_box(returned);
        });
    });

    group.finish();
}

fn bench_activity_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("activity_filter");

    for checkouts in [10u32, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*checkouts as u64));
        group.bench_with_input(
            BenchmarkId::new("filter_by_item", checkouts),
            checkouts,
            |b, &count| {
                let (engine, item) = setup(count);
                for _ in 0..count {
                    engine.checkout(&borrow(&item, 1)).unwrap();
                }
                let filter = ActivityFilter {
                    item_id: Some(item.id_typed()),
                    ..ActivityFilter::default()
                };
                b.iter(|| black_box(engine.activities(&filter).unwrap()));
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_checkout_return_cycle, bench_activity_filter);
criterion_main!(benches);
