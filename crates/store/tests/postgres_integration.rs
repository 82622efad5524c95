//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;
use std::time::Duration;

use common::{Money, OwnerId};
use domain::{Cart, CartLine, NewOrder, OrderError, OrderStatus};
use sqlx::PgPool;
use store::{OrderStore, OwnerLock, PostgresOrderStore, PostgresOwnerLock, StoreError};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_orders_table.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh pool with cleared tables
async fn get_test_pool() -> PgPool {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE orders")
        .execute(&pool)
        .await
        .unwrap();

    pool
}

fn new_order(owner: &str) -> NewOrder {
    let cart = Cart::new(vec![
        CartLine::new("b1", "Dune", Money::from_cents(1000)),
        CartLine::new("b2", "Emma", Money::from_cents(550)),
    ]);
    NewOrder::from_cart(OwnerId::new(owner), &cart, "EUR".into()).unwrap()
}

#[tokio::test]
async fn create_and_get_order() {
    let store = PostgresOrderStore::new(get_test_pool().await);

    let created = store.create(new_order("pg-create")).await.unwrap();
    assert_eq!(created.status(), OrderStatus::Ready);

    let loaded = store.get(created.id()).await.unwrap().unwrap();
    assert_eq!(loaded.id(), created.id());
    assert_eq!(loaded.owner_id().as_str(), "pg-create");
    assert_eq!(loaded.total(), Money::from_cents(1550));
    assert_eq!(loaded.currency().as_str(), "EUR");
    assert_eq!(loaded.lines(), created.lines());
    assert!(loaded.payment_reference().is_none());
}

#[tokio::test]
async fn settle_returns_updated_record() {
    let store = PostgresOrderStore::new(get_test_pool().await);
    let created = store.create(new_order("pg-settle")).await.unwrap();

    let settled = store.settle(created.id(), "pay_1").await.unwrap();
    assert_eq!(settled.status(), OrderStatus::Settled);
    assert_eq!(settled.payment_reference(), Some("pay_1"));
    assert_eq!(settled.total(), created.total());

    // Terminal orders reject further transitions
    let result = store.cancel(created.id()).await;
    assert!(matches!(
        result,
        Err(StoreError::Order(OrderError::InvalidTransition {
            current: OrderStatus::Settled,
            ..
        }))
    ));
}

#[tokio::test]
async fn cancel_and_missing_order() {
    let store = PostgresOrderStore::new(get_test_pool().await);
    let created = store.create(new_order("pg-cancel")).await.unwrap();

    let cancelled = store.cancel(created.id()).await.unwrap();
    assert_eq!(cancelled.status(), OrderStatus::Cancelled);
    assert!(cancelled.payment_reference().is_none());

    let missing = store.settle(common::OrderId::new(), "pay_x").await;
    assert!(matches!(missing, Err(StoreError::OrderNotFound(_))));
}

#[tokio::test]
async fn one_ready_order_per_owner() {
    let store = PostgresOrderStore::new(get_test_pool().await);
    let first = store.create(new_order("pg-ready")).await.unwrap();

    let second = store.create(new_order("pg-ready")).await;
    assert!(matches!(second, Err(StoreError::ReadyOrderExists { .. })));

    let ready = store
        .find_ready_by_owner(&OwnerId::new("pg-ready"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ready.id(), first.id());

    store.settle(first.id(), "pay_1").await.unwrap();
    assert!(
        store
            .find_ready_by_owner(&OwnerId::new("pg-ready"))
            .await
            .unwrap()
            .is_none()
    );
    store.create(new_order("pg-ready")).await.unwrap();

    let listed = store
        .list_by_owner(&OwnerId::new("pg-ready"))
        .await
        .unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed[0].created_at() >= listed[1].created_at());
}

#[tokio::test]
async fn advisory_lock_is_exclusive() {
    let pool = get_test_pool().await;
    let locks = PostgresOwnerLock::new(pool).with_poll_interval(Duration::from_millis(10));
    let owner = OwnerId::new("pg-lock");

    let lease = locks
        .acquire(&owner, Duration::from_millis(200))
        .await
        .unwrap();

    let contended = locks.acquire(&owner, Duration::from_millis(100)).await;
    assert!(matches!(contended, Err(StoreError::LockTimeout { .. })));

    lease.release().await.unwrap();

    let again = locks
        .acquire(&owner, Duration::from_millis(200))
        .await
        .unwrap();
    again.release().await.unwrap();
}

#[tokio::test]
async fn dropped_advisory_lease_frees_lock() {
    let pool = get_test_pool().await;
    let locks = PostgresOwnerLock::new(pool).with_poll_interval(Duration::from_millis(10));
    let owner = OwnerId::new("pg-lock-drop");

    {
        let _lease = locks
            .acquire(&owner, Duration::from_millis(200))
            .await
            .unwrap();
    }

    // The server notices the closed session shortly after the drop.
    let again = locks.acquire(&owner, Duration::from_secs(2)).await.unwrap();
    again.release().await.unwrap();
}
