//! Integration tests for the order lifecycle.
//!
//! These tests drive orders through the public API the stores use: freeze a
//! cart, create, settle or cancel, persist and restore.

use chrono::Utc;
use domain::{
    Cart, CartLine, CurrencyCode, Money, NewOrder, Order, OrderError, OrderId, OrderStatus,
    OwnerId,
};

fn cart() -> Cart {
    Cart::new(vec![
        CartLine::new("b1", "Dune", Money::from_cents(1000)),
        CartLine::new("b2", "Emma", Money::from_cents(550)),
        CartLine::new("b1", "Dune", Money::from_cents(1000)),
    ])
}

fn ready_order() -> Order {
    let input = NewOrder::from_cart(OwnerId::new("u1"), &cart(), CurrencyCode::new("EUR")).unwrap();
    Order::create(OrderId::new(), input, Utc::now())
}

#[test]
fn test_order_lifecycle_to_settled() {
    let mut order = ready_order();
    assert_eq!(order.status(), OrderStatus::Ready);
    assert_eq!(order.total(), Money::from_cents(2550));
    assert_eq!(order.lines().len(), 3);
    assert!(order.payment_reference().is_none());

    order.settle("pay_1", Utc::now()).unwrap();

    assert_eq!(order.status(), OrderStatus::Settled);
    assert_eq!(order.payment_reference(), Some("pay_1"));
    assert!(order.is_terminal());
    assert!(order.updated_at() >= order.created_at());
}

#[test]
fn test_terminal_orders_reject_transitions() {
    let mut settled = ready_order();
    settled.settle("pay_1", Utc::now()).unwrap();
    assert!(matches!(
        settled.cancel(Utc::now()),
        Err(OrderError::InvalidTransition {
            current: OrderStatus::Settled,
            ..
        })
    ));

    let mut cancelled = ready_order();
    cancelled.cancel(Utc::now()).unwrap();
    assert!(matches!(
        cancelled.settle("pay_2", Utc::now()),
        Err(OrderError::InvalidTransition {
            current: OrderStatus::Cancelled,
            ..
        })
    ));
    assert!(cancelled.payment_reference().is_none());
}

#[test]
fn test_lines_do_not_follow_the_cart() {
    let mut source = cart();
    let input = NewOrder::from_cart(OwnerId::new("u1"), &source, CurrencyCode::new("EUR")).unwrap();
    let order = Order::create(OrderId::new(), input, Utc::now());

    source.lines.clear();

    assert_eq!(order.lines().len(), 3);
    assert_eq!(order.total(), Money::from_cents(2550));
}

#[test]
fn test_restore_matches_persisted_fields() {
    let mut original = ready_order();
    original.settle("pay_9", Utc::now()).unwrap();

    let restored = Order::restore(
        original.id(),
        original.owner_id().clone(),
        original.status().as_str().parse().unwrap(),
        original.payment_reference().map(str::to_string),
        original.total(),
        original.currency().clone(),
        original.lines().to_vec(),
        original.created_at(),
        original.updated_at(),
    );

    assert_eq!(restored, original);
}

#[test]
fn test_order_json_uses_lowercase_status() {
    let order = ready_order();

    let json = serde_json::to_value(&order).unwrap();
    assert_eq!(json["status"], "ready");

    let back: Order = serde_json::from_value(json).unwrap();
    assert_eq!(back, order);
}
