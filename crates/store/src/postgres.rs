use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::{CurrencyCode, Money, OrderId, OwnerId};
use domain::{CartLine, NewOrder, Order, OrderError, OrderStatus};
use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres, Row, postgres::PgRow};
use tokio::time::Instant;
use uuid::Uuid;

use crate::{
    Result, StoreError,
    store::{LeaseHandle, OrderStore, OwnerLease, OwnerLock},
};

/// Name of the partial unique index allowing one ready order per owner.
const ONE_READY_PER_OWNER: &str = "orders_one_ready_per_owner";

const ORDER_COLUMNS: &str =
    "id, owner_id, status, currency, total_cents, payment_reference, lines, created_at, updated_at";

/// PostgreSQL-backed order store implementation.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let status: String = row.try_get("status")?;
        let currency: String = row.try_get("currency")?;
        let lines_json: serde_json::Value = row.try_get("lines")?;
        let lines: Vec<CartLine> = serde_json::from_value(lines_json)?;

        Ok(Order::restore(
            OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            OwnerId::new(row.try_get::<String, _>("owner_id")?),
            status.parse::<OrderStatus>()?,
            row.try_get("payment_reference")?,
            Money::from_cents(row.try_get("total_cents")?),
            CurrencyCode::new(currency),
            lines,
            row.try_get("created_at")?,
            row.try_get("updated_at")?,
        ))
    }

    /// Explains why a conditional update matched no row.
    async fn transition_error(&self, order_id: OrderId, action: &'static str) -> StoreError {
        match self.get(order_id).await {
            Ok(Some(order)) => StoreError::Order(OrderError::InvalidTransition {
                order_id,
                current: order.status(),
                action,
            }),
            Ok(None) => StoreError::OrderNotFound(order_id),
            Err(e) => e,
        }
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    #[tracing::instrument(skip(self, order), fields(owner = %order.owner_id))]
    async fn create(&self, order: NewOrder) -> Result<Order> {
        let created = Order::create(OrderId::new(), order, Utc::now());
        let lines_json = serde_json::to_value(created.lines())?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, owner_id, status, currency, total_cents, payment_reference, lines, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, NULL, $6, $7, $7)
            "#,
        )
        .bind(created.id().as_uuid())
        .bind(created.owner_id().as_str())
        .bind(created.status().as_str())
        .bind(created.currency().as_str())
        .bind(created.total().cents())
        .bind(lines_json)
        .bind(created.created_at())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some(ONE_READY_PER_OWNER)
            {
                return StoreError::ReadyOrderExists {
                    owner: created.owner_id().clone(),
                };
            }
            StoreError::Database(e)
        })?;

        metrics::counter!("orders_created_total").increment(1);
        Ok(created)
    }

    #[tracing::instrument(skip(self))]
    async fn settle(&self, order_id: OrderId, payment_reference: &str) -> Result<Order> {
        if payment_reference.trim().is_empty() {
            return Err(OrderError::EmptyPaymentReference.into());
        }

        let row = sqlx::query(&format!(
            r#"
            UPDATE orders
            SET status = $2, payment_reference = $3, updated_at = $4
            WHERE id = $1 AND status = $5
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(order_id.as_uuid())
        .bind(OrderStatus::Settled.as_str())
        .bind(payment_reference)
        .bind(Utc::now())
        .bind(OrderStatus::Ready.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_order(row),
            None => Err(self.transition_error(order_id, "settle").await),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn cancel(&self, order_id: OrderId) -> Result<Order> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE orders
            SET status = $2, updated_at = $3
            WHERE id = $1 AND status = $4
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(order_id.as_uuid())
        .bind(OrderStatus::Cancelled.as_str())
        .bind(Utc::now())
        .bind(OrderStatus::Ready.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_order(row),
            None => Err(self.transition_error(order_id, "cancel").await),
        }
    }

    async fn get(&self, order_id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn find_ready_by_owner(&self, owner: &OwnerId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE owner_id = $1 AND status = $2 LIMIT 1"
        ))
        .bind(owner.as_str())
        .bind(OrderStatus::Ready.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn list_by_owner(&self, owner: &OwnerId) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE owner_id = $1 ORDER BY created_at DESC"
        ))
        .bind(owner.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_order).collect()
    }
}

/// Per-owner lock built on PostgreSQL session advisory locks.
///
/// Each lease pins one pooled connection for its lifetime. The lock key is
/// `hashtextextended(owner, 0)`, computed server-side so every instance
/// derives the same key.
#[derive(Clone)]
pub struct PostgresOwnerLock {
    pool: PgPool,
    poll_interval: Duration,
}

impl PostgresOwnerLock {
    /// Creates a lock table on the given pool, polling every 50ms while contended.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            poll_interval: Duration::from_millis(50),
        }
    }

    /// Overrides the polling interval used while the lock is contended.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

#[async_trait]
impl OwnerLock for PostgresOwnerLock {
    #[tracing::instrument(skip(self))]
    async fn acquire(&self, owner: &OwnerId, timeout: Duration) -> Result<OwnerLease> {
        let deadline = Instant::now() + timeout;
        let timed_out = || StoreError::LockTimeout {
            owner: owner.clone(),
            waited: timeout,
        };

        let mut conn = tokio::time::timeout_at(deadline, self.pool.acquire())
            .await
            .map_err(|_| timed_out())??;

        loop {
            let acquired: bool =
                sqlx::query_scalar("SELECT pg_try_advisory_lock(hashtextextended($1, 0))")
                    .bind(owner.as_str())
                    .fetch_one(&mut *conn)
                    .await?;

            if acquired {
                return Ok(OwnerLease::new(
                    owner.clone(),
                    AdvisoryLease {
                        owner: owner.clone(),
                        conn: Some(conn),
                    },
                ));
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(timed_out());
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}

struct AdvisoryLease {
    owner: OwnerId,
    conn: Option<PoolConnection<Postgres>>,
}

#[async_trait]
impl LeaseHandle for AdvisoryLease {
    async fn release(mut self: Box<Self>) -> Result<()> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };

        let released = sqlx::query_scalar::<_, bool>(
            "SELECT pg_advisory_unlock(hashtextextended($1, 0))",
        )
        .bind(self.owner.as_str())
        .fetch_one(&mut *conn)
        .await;

        match released {
            Ok(true) => Ok(()),
            Ok(false) => {
                tracing::warn!(owner = %self.owner, "advisory lock was not held at release");
                Ok(())
            }
            Err(e) => {
                // Closing the session is the only other way to drop the lock.
                drop(conn.detach());
                Err(e.into())
            }
        }
    }
}

impl Drop for AdvisoryLease {
    fn drop(&mut self) {
        // An unreleased lease must not go back to the pool still holding the lock.
        if let Some(conn) = self.conn.take() {
            drop(conn.detach());
        }
    }
}
