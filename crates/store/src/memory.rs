use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::{OrderId, OwnerId};
use domain::{Cart, NewOrder, Order, OrderStatus};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::{
    Result, StoreError,
    store::{CartStore, LeaseHandle, OrderStore, OwnerLease, OwnerLock},
};

/// In-memory cart store for testing and local runs.
///
/// Supports failure injection so callers can exercise degraded paths.
#[derive(Clone, Default)]
pub struct InMemoryCartStore {
    carts: Arc<RwLock<HashMap<OwnerId, Cart>>>,
    unavailable: Arc<AtomicBool>,
    failing_deletes: Arc<AtomicU32>,
}

impl InMemoryCartStore {
    /// Creates a new empty in-memory cart store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every operation fail while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Makes the next `count` delete calls fail.
    pub fn fail_next_deletes(&self, count: u32) {
        self.failing_deletes.store(count, Ordering::SeqCst);
    }

    /// Returns the number of stored carts.
    pub async fn cart_count(&self) -> usize {
        self.carts.read().await.len()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("cart store is down".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CartStore for InMemoryCartStore {
    async fn read(&self, owner: &OwnerId) -> Result<Option<Cart>> {
        self.check_available()?;
        Ok(self.carts.read().await.get(owner).cloned())
    }

    async fn replace(&self, owner: &OwnerId, cart: Cart) -> Result<()> {
        self.check_available()?;
        self.carts.write().await.insert(owner.clone(), cart);
        Ok(())
    }

    async fn delete(&self, owner: &OwnerId) -> Result<()> {
        self.check_available()?;
        let injected = self
            .failing_deletes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Unavailable("cart delete failed".to_string()));
        }
        self.carts.write().await.remove(owner);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct OrderFailures {
    create: AtomicBool,
    settle: AtomicBool,
    cancel: AtomicBool,
}

/// In-memory order store for testing and local runs.
///
/// Enforces the same rules as the PostgreSQL implementation: transitions
/// only from `Ready`, and at most one `Ready` order per owner.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
    failures: Arc<OrderFailures>,
}

impl InMemoryOrderStore {
    /// Creates a new empty in-memory order store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures `create` to fail.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.failures.create.store(fail, Ordering::SeqCst);
    }

    /// Configures `settle` to fail.
    pub fn set_fail_on_settle(&self, fail: bool) {
        self.failures.settle.store(fail, Ordering::SeqCst);
    }

    /// Configures `cancel` to fail.
    pub fn set_fail_on_cancel(&self, fail: bool) {
        self.failures.cancel.store(fail, Ordering::SeqCst);
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }

    /// Clears all orders.
    pub async fn clear(&self) {
        self.orders.write().await.clear();
    }

    async fn transition(
        &self,
        order_id: OrderId,
        apply: impl FnOnce(&mut Order) -> std::result::Result<(), domain::OrderError>,
    ) -> Result<Order> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(&order_id)
            .ok_or(StoreError::OrderNotFound(order_id))?;

        // Apply on a copy so a rejected transition leaves the record untouched.
        let mut updated = order.clone();
        apply(&mut updated)?;
        *order = updated.clone();
        Ok(updated)
    }
}

fn injected(flag: &AtomicBool, operation: &str) -> Result<()> {
    if flag.load(Ordering::SeqCst) {
        return Err(StoreError::Unavailable(format!("order {operation} failed")));
    }
    Ok(())
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create(&self, order: NewOrder) -> Result<Order> {
        injected(&self.failures.create, "create")?;

        let mut orders = self.orders.write().await;
        let has_ready = orders
            .values()
            .any(|o| o.owner_id() == &order.owner_id && o.status() == OrderStatus::Ready);
        if has_ready {
            return Err(StoreError::ReadyOrderExists {
                owner: order.owner_id,
            });
        }

        let created = Order::create(OrderId::new(), order, Utc::now());
        orders.insert(created.id(), created.clone());
        Ok(created)
    }

    async fn settle(&self, order_id: OrderId, payment_reference: &str) -> Result<Order> {
        injected(&self.failures.settle, "settle")?;
        self.transition(order_id, |order| order.settle(payment_reference, Utc::now()))
            .await
    }

    async fn cancel(&self, order_id: OrderId) -> Result<Order> {
        injected(&self.failures.cancel, "cancel")?;
        self.transition(order_id, |order| order.cancel(Utc::now()))
            .await
    }

    async fn get(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(&order_id).cloned())
    }

    async fn find_ready_by_owner(&self, owner: &OwnerId) -> Result<Option<Order>> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .find(|o| o.owner_id() == owner && o.status() == OrderStatus::Ready)
            .cloned())
    }

    async fn list_by_owner(&self, owner: &OwnerId) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .orders
            .read()
            .await
            .values()
            .filter(|o| o.owner_id() == owner)
            .cloned()
            .collect();
        orders.sort_by_key(|o| std::cmp::Reverse(o.created_at()));
        Ok(orders)
    }
}

/// In-process per-owner lock.
///
/// Only serializes checkouts within one process; use
/// [`PostgresOwnerLock`](crate::PostgresOwnerLock) when several instances
/// share the order store.
///
/// A slot exists only while some lease holds or waits for it; the last
/// lease to let go removes it.
#[derive(Clone, Default)]
pub struct InMemoryOwnerLock {
    slots: Arc<StdMutex<Slots>>,
}

type Slots = HashMap<OwnerId, Arc<Mutex<()>>>;

fn lock_slots(slots: &StdMutex<Slots>) -> MutexGuard<'_, Slots> {
    slots.lock().unwrap_or_else(|e| e.into_inner())
}

impl InMemoryOwnerLock {
    /// Creates a new lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the owner's lock is currently held.
    pub async fn is_locked(&self, owner: &OwnerId) -> bool {
        match lock_slots(&self.slots).get(owner) {
            Some(slot) => slot.try_lock().is_err(),
            None => false,
        }
    }

    /// Returns the number of owners with a held or awaited lock.
    pub fn tracked_owners(&self) -> usize {
        lock_slots(&self.slots).len()
    }
}

struct MemoryLease {
    owner: OwnerId,
    slots: Arc<StdMutex<Slots>>,
    guard: Option<OwnedMutexGuard<()>>,
}

#[async_trait]
impl LeaseHandle for MemoryLease {
    async fn release(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

impl Drop for MemoryLease {
    fn drop(&mut self) {
        drop(self.guard.take());

        // Waiters clone the slot under the map lock, so a count of one
        // means nobody else can reach it.
        let mut slots = lock_slots(&self.slots);
        if slots
            .get(&self.owner)
            .is_some_and(|slot| Arc::strong_count(slot) == 1)
        {
            slots.remove(&self.owner);
        }
    }
}

#[async_trait]
impl OwnerLock for InMemoryOwnerLock {
    async fn acquire(&self, owner: &OwnerId, timeout: Duration) -> Result<OwnerLease> {
        let slot = lock_slots(&self.slots)
            .entry(owner.clone())
            .or_default()
            .clone();

        match tokio::time::timeout(timeout, slot.lock_owned()).await {
            Ok(guard) => Ok(OwnerLease::new(
                owner.clone(),
                MemoryLease {
                    owner: owner.clone(),
                    slots: Arc::clone(&self.slots),
                    guard: Some(guard),
                },
            )),
            Err(_) => Err(StoreError::LockTimeout {
                owner: owner.clone(),
                waited: timeout,
            }),
        }
    }
}
