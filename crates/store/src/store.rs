use std::time::Duration;

use async_trait::async_trait;
use common::{OrderId, OwnerId};
use domain::{Cart, NewOrder, Order};

use crate::Result;

/// Cart storage keyed by owner identity.
///
/// Carts are stored as whole values; there are no partial updates.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Reads the owner's cart, or `None` if there is none.
    async fn read(&self, owner: &OwnerId) -> Result<Option<Cart>>;

    /// Replaces the owner's cart with a new value.
    async fn replace(&self, owner: &OwnerId, cart: Cart) -> Result<()>;

    /// Deletes the owner's cart.
    ///
    /// Deleting an absent cart is not an error.
    async fn delete(&self, owner: &OwnerId) -> Result<()>;
}

/// Durable order storage.
///
/// Implementations enforce the order state machine: `settle` and `cancel`
/// only apply to `Ready` orders and fail with
/// [`OrderError::InvalidTransition`](domain::OrderError::InvalidTransition)
/// otherwise. At most one `Ready` order may exist per owner; `create`
/// fails with [`StoreError::ReadyOrderExists`](crate::StoreError::ReadyOrderExists)
/// when that would be violated.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists a new order in the `Ready` state.
    async fn create(&self, order: NewOrder) -> Result<Order>;

    /// Transitions a `Ready` order to `Settled`, returning the updated record.
    async fn settle(&self, order_id: OrderId, payment_reference: &str) -> Result<Order>;

    /// Transitions a `Ready` order to `Cancelled`, returning the updated record.
    async fn cancel(&self, order_id: OrderId) -> Result<Order>;

    /// Loads an order by ID.
    async fn get(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Finds the owner's `Ready` order, if any.
    async fn find_ready_by_owner(&self, owner: &OwnerId) -> Result<Option<Order>>;

    /// Lists all orders of an owner, newest first.
    async fn list_by_owner(&self, owner: &OwnerId) -> Result<Vec<Order>>;
}

/// Per-owner exclusive lock.
///
/// This is the only cross-request synchronization primitive: a checkout
/// holds its owner's lease from reading the cart until the cart is released.
#[async_trait]
pub trait OwnerLock: Send + Sync {
    /// Acquires the owner's lock, waiting at most `timeout`.
    ///
    /// Fails with [`StoreError::LockTimeout`](crate::StoreError::LockTimeout)
    /// when the lock is still held elsewhere after `timeout`.
    async fn acquire(&self, owner: &OwnerId, timeout: Duration) -> Result<OwnerLease>;
}

/// Backend-specific part of a held lease.
#[async_trait]
pub trait LeaseHandle: Send {
    /// Releases the lock explicitly.
    async fn release(self: Box<Self>) -> Result<()>;
}

/// A held per-owner lock.
///
/// Dropping the lease without calling [`OwnerLease::release`] still frees the
/// lock; `release` only allows the backend to report failures.
pub struct OwnerLease {
    owner: OwnerId,
    handle: Box<dyn LeaseHandle>,
}

impl OwnerLease {
    /// Wraps a backend handle for the given owner.
    pub fn new(owner: OwnerId, handle: impl LeaseHandle + 'static) -> Self {
        Self {
            owner,
            handle: Box::new(handle),
        }
    }

    /// Returns the owner whose lock is held.
    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    /// Releases the lock.
    pub async fn release(self) -> Result<()> {
        self.handle.release().await
    }
}

impl std::fmt::Debug for OwnerLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnerLease")
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}
