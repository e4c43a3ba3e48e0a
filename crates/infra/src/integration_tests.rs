//! Integration tests for the full engine under concurrent callers.
//!
//! Verifies:
//! - Concurrent movements never drive stock below zero
//! - Order numbers stay unique and increasing under concurrent creation
//! - Item writes and order totals stay consistent under contention
//! - Tenant isolation holds across every entry point

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::{Arc, Barrier};
    use std::thread;

    use chrono::NaiveDate;
    use proptest::prelude::*;

    use stockledger_core::{AggregateId, DomainError, TenantId};
    use stockledger_inventory::{
        Direction, LocationId, ProductId, StockClassification, StockLevels, StockSettings,
    };
    use stockledger_purchasing::{PurchaseOrderId, PurchaseOrderStatus, SupplierId};

    use crate::config::EngineConfig;
    use crate::engine::StockEngine;
    use crate::error::EngineError;
    use crate::ledger::{MovementRequest, NewProduct};
    use crate::orders::NewOrderItem;

    fn engine_with_attempts(max_commit_attempts: u32) -> Arc<StockEngine> {
        stockledger_observability::init_for_tests();
        Arc::new(StockEngine::in_memory(EngineConfig {
            max_commit_attempts,
            ..EngineConfig::default()
        }))
    }

    fn register(engine: &StockEngine, tenant: TenantId, sku: &str, min: i64) -> ProductId {
        engine
            .register_product(
                tenant,
                NewProduct {
                    product_id: ProductId::new(AggregateId::new()),
                    sku: sku.to_string(),
                    name: sku.to_string(),
                    settings: StockSettings {
                        min_stock_level: min,
                        max_stock_level: None,
                        cost_price: 0,
                        selling_price: 0,
                    },
                    is_digital: false,
                },
            )
            .unwrap()
            .id_typed()
    }

    fn new_order(engine: &StockEngine, tenant: TenantId) -> PurchaseOrderId {
        engine
            .create_purchase_order(
                tenant,
                SupplierId::new(AggregateId::new()),
                NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
                None,
            )
            .unwrap()
            .id_typed()
    }

    #[test]
    fn concurrent_outbound_movements_never_oversell() {
        const THREADS: usize = 16;
        // Every thread can lose at most THREADS races before it wins or
        // observes insufficient stock.
        let engine = engine_with_attempts(THREADS as u32 + 1);
        let tenant = TenantId::new();
        let product = register(&engine, tenant, "MUG", 0);
        engine
            .record_movement(tenant, product, MovementRequest::inbound(100))
            .unwrap();

        let barrier = Arc::new(Barrier::new(THREADS));
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let engine = Arc::clone(&engine);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    engine.record_movement(tenant, product, MovementRequest::outbound(15))
                })
            })
            .collect();

        let mut succeeded = 0;
        let mut insufficient = 0;
        for h in handles {
            match h.join().unwrap() {
                Ok(_) => succeeded += 1,
                Err(EngineError::Domain(DomainError::InsufficientStock { requested, .. })) => {
                    assert_eq!(requested, 15);
                    insufficient += 1;
                }
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(succeeded, 6);
        assert_eq!(insufficient, THREADS - 6);

        let stock = engine.get_product(tenant, product).unwrap().current_stock();
        assert_eq!(stock, 10);

        let ledger = engine.movements(tenant, product, None).unwrap();
        assert_eq!(ledger.len(), 1 + succeeded);
        assert_eq!(StockLevels::replay(&ledger).unwrap().total(), stock);
    }

    #[test]
    fn default_retry_bound_keeps_stock_consistent_under_contention() {
        const THREADS: usize = 32;
        let engine = engine_with_attempts(EngineConfig::default().max_commit_attempts);
        let tenant = TenantId::new();
        let product = register(&engine, tenant, "JAR", 0);
        engine
            .record_movement(tenant, product, MovementRequest::inbound(100))
            .unwrap();

        let barrier = Arc::new(Barrier::new(THREADS));
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let engine = Arc::clone(&engine);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    engine.record_movement(tenant, product, MovementRequest::outbound(15))
                })
            })
            .collect();

        let mut succeeded = 0i64;
        for h in handles {
            match h.join().unwrap() {
                Ok(record) => {
                    assert!(record.current_stock >= 0);
                    succeeded += 1;
                }
                Err(EngineError::Domain(
                    DomainError::InsufficientStock { .. } | DomainError::Conflict(_),
                )) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert!(succeeded <= 6);
        let stock = engine.get_product(tenant, product).unwrap().current_stock();
        assert_eq!(stock, 100 - 15 * succeeded);

        let ledger = engine.movements(tenant, product, None).unwrap();
        assert_eq!(ledger.len() as i64, 1 + succeeded);
        assert_eq!(StockLevels::replay(&ledger).unwrap().total(), stock);
    }

    #[test]
    fn movements_on_different_products_do_not_conflict() {
        // A single attempt is enough when no two writers share a stream.
        let engine = engine_with_attempts(1);
        let tenant = TenantId::new();
        let products: Vec<_> = (0..8)
            .map(|i| register(&engine, tenant, &format!("SKU-{i}"), 0))
            .collect();

        let barrier = Arc::new(Barrier::new(products.len()));
        let handles: Vec<_> = products
            .iter()
            .map(|&product| {
                let engine = Arc::clone(&engine);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..20 {
                        engine
                            .record_movement(tenant, product, MovementRequest::inbound(1))
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        for product in products {
            assert_eq!(engine.get_product(tenant, product).unwrap().current_stock(), 20);
        }
    }

    #[test]
    fn concurrent_order_creation_issues_unique_increasing_numbers() {
        let engine = engine_with_attempts(3);
        let tenant = TenantId::new();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = Arc::clone(&engine);
                thread::spawn(move || {
                    (0..10)
                        .map(|_| {
                            let id = new_order(&engine, tenant);
                            engine.get_order(tenant, id).unwrap().order_number().value()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for h in handles {
            let numbers = h.join().unwrap();
            assert!(numbers.windows(2).all(|w| w[0] < w[1]));
            for n in numbers {
                assert!(seen.insert(n), "order number {n} issued twice");
            }
        }
        assert_eq!(seen, (1..=80).collect::<HashSet<u64>>());

        let listed: Vec<u64> = engine
            .list_orders(tenant)
            .unwrap()
            .iter()
            .map(|o| o.order_number().value())
            .collect();
        assert_eq!(listed, (1..=80).collect::<Vec<u64>>());
    }

    #[test]
    fn concurrent_item_writes_keep_total_consistent() {
        const THREADS: usize = 8;
        const ITEMS_PER_THREAD: i64 = 5;
        let engine = engine_with_attempts(THREADS as u32 * ITEMS_PER_THREAD as u32 + 1);
        let tenant = TenantId::new();
        let product = register(&engine, tenant, "BOLT", 0);
        let order = new_order(&engine, tenant);

        let handles: Vec<_> = (0..THREADS as i64)
            .map(|t| {
                let engine = Arc::clone(&engine);
                thread::spawn(move || {
                    for i in 1..=ITEMS_PER_THREAD {
                        engine
                            .add_order_item(
                                tenant,
                                order,
                                NewOrderItem {
                                    product_id: product,
                                    quantity: i,
                                    unit_price: 10 * (t + 1),
                                },
                            )
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let order = engine.get_order(tenant, order).unwrap();
        assert_eq!(order.items().len(), THREADS * ITEMS_PER_THREAD as usize);
        let sum: i64 = order.items().iter().map(|i| i.line_total).sum();
        assert_eq!(order.total_amount(), sum);
        // Σ_t Σ_i i·10(t+1) = 15 · 10 · 36
        assert_eq!(order.total_amount(), 5400);
    }

    #[test]
    fn every_entry_point_hides_foreign_tenant_data() {
        let engine = engine_with_attempts(3);
        let owner = TenantId::new();
        let stranger = TenantId::new();
        let product = register(&engine, owner, "LAMP", 5);
        let order = new_order(&engine, owner);

        let not_found = |r: Result<(), EngineError>| assert!(r.unwrap_err().is_not_found());
        not_found(engine.get_product(stranger, product).map(drop));
        not_found(engine.movements(stranger, product, None).map(drop));
        not_found(
            engine
                .record_movement(stranger, product, MovementRequest::inbound(1))
                .map(drop),
        );
        not_found(
            engine
                .update_product_settings(stranger, product, StockSettings::default(), true)
                .map(drop),
        );
        not_found(engine.forecast_stockout(stranger, product, None).map(drop));
        not_found(engine.get_order(stranger, order).map(drop));
        not_found(
            engine
                .change_order_status(stranger, order, PurchaseOrderStatus::Cancelled)
                .map(drop),
        );
        let item = engine
            .add_order_item(
                owner,
                order,
                NewOrderItem {
                    product_id: product,
                    quantity: 2,
                    unit_price: 50,
                },
            )
            .unwrap()
            .items()[0]
            .id;
        not_found(
            engine
                .update_order_item(stranger, order, item, 9, 9)
                .map(drop),
        );
        not_found(engine.remove_order_item(stranger, order, item).map(drop));
        let untouched = engine.get_order(owner, order).unwrap();
        assert_eq!(untouched.items().len(), 1);
        assert_eq!(untouched.total_amount(), 100);

        // The stranger cannot reference the owner's product from their own order.
        let stranger_order = new_order(&engine, stranger);
        not_found(
            engine
                .add_order_item(
                    stranger,
                    stranger_order,
                    NewOrderItem {
                        product_id: product,
                        quantity: 1,
                        unit_price: 1,
                    },
                )
                .map(drop),
        );

        assert!(engine.get_stock_alerts(stranger).unwrap().is_empty());
        assert_eq!(engine.get_stock_alerts(owner).unwrap().len(), 1);
    }

    #[test]
    fn stock_and_order_scenarios_end_to_end() {
        let engine = engine_with_attempts(3);
        let tenant = TenantId::new();
        let product = register(&engine, tenant, "TEA", 10);

        engine
            .record_movement(tenant, product, MovementRequest::inbound(50))
            .unwrap();
        let r = engine
            .record_movement(tenant, product, MovementRequest::outbound(45))
            .unwrap();
        assert_eq!(r.current_stock, 5);
        assert_eq!(
            engine.get_stock_alerts(tenant).unwrap()[0].classification,
            StockClassification::LowStock
        );
        engine
            .record_movement(tenant, product, MovementRequest::outbound(5))
            .unwrap();
        assert_eq!(
            engine.get_stock_alerts(tenant).unwrap()[0].classification,
            StockClassification::OutOfStock
        );
        let err = engine
            .record_movement(tenant, product, MovementRequest::outbound(1))
            .unwrap_err();
        assert_eq!(err, EngineError::Domain(DomainError::insufficient_stock(1, 0)));

        let order = new_order(&engine, tenant);
        let line = |quantity, unit_price| NewOrderItem {
            product_id: product,
            quantity,
            unit_price,
        };
        let o = engine.add_order_item(tenant, order, line(10, 200)).unwrap();
        assert_eq!(o.total_amount(), 2000);
        let first = o.items()[0].id;
        assert_eq!(
            engine
                .add_order_item(tenant, order, line(5, 50))
                .unwrap()
                .total_amount(),
            2250
        );
        assert_eq!(
            engine
                .remove_order_item(tenant, order, first)
                .unwrap()
                .total_amount(),
            250
        );

        assert!(matches!(
            engine.change_order_status(tenant, order, PurchaseOrderStatus::Received),
            Err(EngineError::Domain(DomainError::InvalidTransition { .. }))
        ));
        for status in [
            PurchaseOrderStatus::Submitted,
            PurchaseOrderStatus::Approved,
            PurchaseOrderStatus::Ordered,
            PurchaseOrderStatus::Received,
        ] {
            engine.change_order_status(tenant, order, status).unwrap();
        }
    }

    #[derive(Debug, Clone)]
    enum Op {
        In(i64),
        Out(i64),
        Adjust(bool, i64),
        Transfer(bool, i64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1i64..40).prop_map(Op::In),
            (1i64..40).prop_map(Op::Out),
            (any::<bool>(), 1i64..20).prop_map(|(up, q)| Op::Adjust(up, q)),
            (any::<bool>(), 1i64..30).prop_map(|(to_back, q)| Op::Transfer(to_back, q)),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            ..ProptestConfig::default()
        })]

        /// Property: whatever the mix of accepted and rejected movements, the
        /// committed ledger replays to the product's current stock and no
        /// level is negative.
        #[test]
        fn ledger_replays_to_current_stock(ops in prop::collection::vec(op(), 1..40)) {
            let engine = engine_with_attempts(3);
            let tenant = TenantId::new();
            let product = register(&engine, tenant, "PROP", 0);
            let main = LocationId::default();
            let back = LocationId::new("back").unwrap();

            for op in ops {
                let request = match op {
                    Op::In(q) => MovementRequest::inbound(q),
                    Op::Out(q) => MovementRequest::outbound(q),
                    Op::Adjust(up, q) => MovementRequest::adjustment(
                        if up { Direction::Inbound } else { Direction::Outbound },
                        q,
                    ),
                    Op::Transfer(true, q) => MovementRequest::transfer(main.clone(), back.clone(), q),
                    Op::Transfer(false, q) => MovementRequest::transfer(back.clone(), main.clone(), q),
                };
                match engine.record_movement(tenant, product, request) {
                    Ok(_) | Err(EngineError::Domain(DomainError::InsufficientStock { .. })) => {}
                    Err(other) => prop_assert!(false, "unexpected error: {}", other),
                }
            }

            let current = engine.get_product(tenant, product).unwrap();
            let ledger = engine.movements(tenant, product, None).unwrap();
            let replayed = StockLevels::replay(&ledger).unwrap();

            prop_assert_eq!(replayed.total(), current.current_stock());
            prop_assert_eq!(&replayed, current.stock());
            prop_assert!(replayed.locations().all(|(_, q)| q >= 0));
        }
    }
}
