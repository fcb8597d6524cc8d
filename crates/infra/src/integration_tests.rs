//! End-to-end tests for the order engine against the in-memory store.
//!
//! Covers the full lifecycle (place → cancel/deliver), the counter
//! invariants at every committed state, rollback on mid-transaction
//! failure, and the concurrent-oversell property.

use std::sync::{Arc, Barrier};
use std::thread;

use stockgate_catalog::{Customer, Product};
use stockgate_core::{CustomerId, DomainError, OrderId, ProductId};
use stockgate_inventory::StockLevel;
use stockgate_orders::OrderStatus;

use crate::service::{OrderItemRequest, OrderService};
use crate::store::{InMemoryStore, Store};

struct Fixture {
    service: OrderService<Arc<InMemoryStore>>,
    customer_id: CustomerId,
    product_id: ProductId,
}

/// Seed one customer and one product priced 500 with `on_hand`/`reserved`
/// counters as given.
fn setup(on_hand: u32, reserved: u32) -> Fixture {
    crate::telemetry::init();

    let store = Arc::new(InMemoryStore::new());
    let customer_id = CustomerId::new();
    let product_id = ProductId::new();

    store
        .seed_customer(
            Customer::new(customer_id, "Ada Lovelace")
                .unwrap()
                .with_email("ada@example.com"),
        )
        .unwrap();
    store
        .seed_product(Product::new(product_id, "SKU-1", "Widget", 500).unwrap())
        .unwrap();
    store
        .seed_stock(StockLevel::new(product_id, on_hand, reserved).unwrap())
        .unwrap();

    Fixture {
        service: OrderService::new(store),
        customer_id,
        product_id,
    }
}

fn request(product_id: ProductId, qty: u32) -> OrderItemRequest {
    OrderItemRequest { product_id, qty }
}

fn stock_of(fixture: &Fixture) -> StockLevel {
    fixture
        .service
        .store()
        .stock_level(fixture.product_id)
        .unwrap()
        .unwrap()
}

#[test]
fn create_order_reserves_stock_and_starts_pending() {
    let fx = setup(10, 0);

    let order = fx
        .service
        .create_order(fx.customer_id, &[request(fx.product_id, 4)])
        .unwrap();

    assert_eq!(order.status(), OrderStatus::Pending);
    assert_eq!(order.total(), 2000);
    assert_eq!(order.customer_id(), fx.customer_id);

    let stock = stock_of(&fx);
    assert_eq!(stock.on_hand(), 10);
    assert_eq!(stock.reserved(), 4);
}

#[test]
fn cancelling_returns_reserved_stock() {
    let fx = setup(10, 0);
    let order = fx
        .service
        .create_order(fx.customer_id, &[request(fx.product_id, 4)])
        .unwrap();

    let updated = fx
        .service
        .update_order_status(order.id(), OrderStatus::Cancelled)
        .unwrap();

    assert_eq!(updated.status(), OrderStatus::Cancelled);
    let stock = stock_of(&fx);
    assert_eq!(stock.on_hand(), 10);
    assert_eq!(stock.reserved(), 0);
}

#[test]
fn delivering_consumes_stock() {
    let fx = setup(10, 0);
    let order = fx
        .service
        .create_order(fx.customer_id, &[request(fx.product_id, 4)])
        .unwrap();

    let updated = fx
        .service
        .update_order_status(order.id(), OrderStatus::Delivered)
        .unwrap();

    assert_eq!(updated.status(), OrderStatus::Delivered);
    let stock = stock_of(&fx);
    assert_eq!(stock.on_hand(), 6);
    assert_eq!(stock.reserved(), 0);
}

#[test]
fn fully_reserved_stock_rejects_new_orders() {
    let fx = setup(5, 5);

    let err = fx
        .service
        .create_order(fx.customer_id, &[request(fx.product_id, 1)])
        .unwrap_err();

    assert!(matches!(
        err,
        DomainError::InsufficientStock {
            requested: 1,
            available: 0,
            ..
        }
    ));
    let stock = stock_of(&fx);
    assert_eq!(stock.on_hand(), 5);
    assert_eq!(stock.reserved(), 5);
}

#[test]
fn unknown_product_fails_before_any_mutation() {
    let fx = setup(10, 0);
    let missing = ProductId::new();

    let err = fx
        .service
        .create_order(fx.customer_id, &[request(missing, 1)])
        .unwrap_err();

    assert!(matches!(err, DomainError::ProductNotFound(id) if id == missing));
    let stock = stock_of(&fx);
    assert_eq!(stock.reserved(), 0);
}

#[test]
fn empty_and_zero_quantity_requests_are_rejected() {
    let fx = setup(10, 0);

    let err = fx.service.create_order(fx.customer_id, &[]).unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));

    let err = fx
        .service
        .create_order(fx.customer_id, &[request(fx.product_id, 0)])
        .unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));
}

#[test]
fn terminal_orders_reject_further_transitions() {
    let fx = setup(10, 0);
    let order = fx
        .service
        .create_order(fx.customer_id, &[request(fx.product_id, 4)])
        .unwrap();
    fx.service
        .update_order_status(order.id(), OrderStatus::Cancelled)
        .unwrap();

    // Re-cancelling must not release stock a second time.
    let err = fx
        .service
        .update_order_status(order.id(), OrderStatus::Cancelled)
        .unwrap_err();
    assert!(matches!(err, DomainError::InvalidTransition { .. }));

    let err = fx
        .service
        .update_order_status(order.id(), OrderStatus::Delivered)
        .unwrap_err();
    assert!(matches!(err, DomainError::InvalidTransition { .. }));

    let stock = stock_of(&fx);
    assert_eq!(stock.on_hand(), 10);
    assert_eq!(stock.reserved(), 0);
}

#[test]
fn unknown_order_fails_status_update() {
    let fx = setup(10, 0);
    let missing = OrderId::new();

    let err = fx
        .service
        .update_order_status(missing, OrderStatus::Cancelled)
        .unwrap_err();
    assert!(matches!(err, DomainError::OrderNotFound(id) if id == missing));
}

#[test]
fn pending_to_pending_has_no_stock_side_effect() {
    let fx = setup(10, 0);
    let order = fx
        .service
        .create_order(fx.customer_id, &[request(fx.product_id, 4)])
        .unwrap();

    let updated = fx
        .service
        .update_order_status(order.id(), OrderStatus::Pending)
        .unwrap();

    assert_eq!(updated.status(), OrderStatus::Pending);
    let stock = stock_of(&fx);
    assert_eq!(stock.reserved(), 4);
}

#[test]
fn multi_product_order_reserves_every_line() {
    let fx = setup(10, 0);
    let second = ProductId::new();
    let store = fx.service.store();
    store
        .seed_product(Product::new(second, "SKU-2", "Gadget", 300).unwrap())
        .unwrap();
    store
        .seed_stock(StockLevel::new(second, 7, 0).unwrap())
        .unwrap();

    let order = fx
        .service
        .create_order(
            fx.customer_id,
            &[request(fx.product_id, 2), request(second, 3)],
        )
        .unwrap();

    assert_eq!(order.total(), 2 * 500 + 3 * 300);
    assert_eq!(stock_of(&fx).reserved(), 2);
    assert_eq!(store.stock_level(second).unwrap().unwrap().reserved(), 3);
}

#[test]
fn reservation_failure_inside_transaction_rolls_back_every_line() {
    // Two lines for the same product pass the per-line pre-check (6 <= 10
    // each) but the second reserve trips inside the transaction. Nothing
    // must survive.
    let fx = setup(10, 0);

    let err = fx
        .service
        .create_order(
            fx.customer_id,
            &[request(fx.product_id, 6), request(fx.product_id, 6)],
        )
        .unwrap_err();

    assert!(matches!(err, DomainError::InsufficientStock { .. }));
    let stock = stock_of(&fx);
    assert_eq!(stock.reserved(), 0);
}

#[test]
fn order_view_is_fully_populated() {
    let fx = setup(10, 0);
    let order = fx
        .service
        .create_order(fx.customer_id, &[request(fx.product_id, 2)])
        .unwrap();

    let view = fx.service.order_details(order.id()).unwrap();
    assert_eq!(view.order.id(), order.id());
    assert_eq!(view.customer.name(), "Ada Lovelace");
    assert_eq!(view.lines.len(), 1);
    assert_eq!(view.lines[0].product.sku(), "SKU-1");
    assert_eq!(view.lines[0].item.qty, 2);

    let missing = OrderId::new();
    let err = fx.service.order_details(missing).unwrap_err();
    assert!(matches!(err, DomainError::OrderNotFound(id) if id == missing));
}

#[test]
fn catalog_price_changes_never_touch_existing_orders() {
    let fx = setup(10, 0);
    let order = fx
        .service
        .create_order(fx.customer_id, &[request(fx.product_id, 2)])
        .unwrap();
    assert_eq!(order.total(), 1000);

    // Reprice the product after the order exists.
    let mut product = fx
        .service
        .store()
        .product(fx.product_id)
        .unwrap()
        .unwrap();
    product.set_price(900);
    fx.service.store().seed_product(product).unwrap();

    let view = fx.service.order_details(order.id()).unwrap();
    assert_eq!(view.order.total(), 1000);
    assert_eq!(view.lines[0].item.price_at_purchase, 500);
    assert_eq!(view.lines[0].product.price(), 900);
}

#[test]
fn concurrent_terminal_transitions_apply_exactly_once() {
    // A cancel and a deliver race on one PENDING order: exactly one
    // transition wins, the loser observes the terminal state, and stock
    // reflects only the winning adjustment.
    let fx = setup(10, 0);
    let order = fx
        .service
        .create_order(fx.customer_id, &[request(fx.product_id, 4)])
        .unwrap();

    let service = Arc::new(fx.service);
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = [OrderStatus::Cancelled, OrderStatus::Delivered]
        .into_iter()
        .map(|next| {
            let service = service.clone();
            let barrier = barrier.clone();
            let order_id = order.id();
            thread::spawn(move || {
                barrier.wait();
                service.update_order_status(order_id, next)
            })
        })
        .collect();

    let results: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("worker thread panicked"))
        .collect();

    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one transition may win the race");
    let failure = results
        .iter()
        .find_map(|r| r.as_ref().err())
        .expect("one transition must lose the race");
    assert!(matches!(failure, DomainError::InvalidTransition { .. }));

    let winner = results
        .iter()
        .find_map(|r| r.as_ref().ok())
        .expect("one transition must win the race");
    let stock = service
        .store()
        .stock_level(fx.product_id)
        .unwrap()
        .unwrap();
    match winner.status() {
        OrderStatus::Cancelled => {
            assert_eq!(stock.on_hand(), 10);
            assert_eq!(stock.reserved(), 0);
        }
        OrderStatus::Delivered => {
            assert_eq!(stock.on_hand(), 6);
            assert_eq!(stock.reserved(), 0);
        }
        OrderStatus::Pending => panic!("winner cannot remain pending"),
    }
}

#[test]
fn concurrent_orders_cannot_oversell() {
    // on_hand = 10, two concurrent orders of 6: exactly one may win.
    let fx = setup(10, 0);
    let service = Arc::new(fx.service);
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let service = service.clone();
            let barrier = barrier.clone();
            let customer_id = fx.customer_id;
            let product_id = fx.product_id;
            thread::spawn(move || {
                barrier.wait();
                service.create_order(customer_id, &[request(product_id, 6)])
            })
        })
        .collect();

    let results: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("worker thread panicked"))
        .collect();

    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one order may win the race");
    let failure = results
        .iter()
        .find_map(|r| r.as_ref().err())
        .expect("one order must lose the race");
    assert!(matches!(failure, DomainError::InsufficientStock { .. }));

    let stock = service
        .store()
        .stock_level(fx.product_id)
        .unwrap()
        .unwrap();
    assert_eq!(stock.on_hand(), 10);
    assert_eq!(stock.reserved(), 6);
    assert!(stock.reserved() <= stock.on_hand());
}
