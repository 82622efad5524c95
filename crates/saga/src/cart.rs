//! Cart edits priced through the catalog.

use std::sync::Arc;
use std::time::Duration;

use common::OwnerId;
use domain::{Cart, CartLine};
use store::{CartStore, OwnerLease, OwnerLock, StoreError};

use crate::error::{CartError, RemoteError};
use crate::services::catalog::CatalogService;

/// Reads and replaces carts.
///
/// Writes take the owner's lock, so a cart cannot change between a
/// checkout's snapshot and its release of the cart.
pub struct CartService {
    carts: Arc<dyn CartStore>,
    catalog: Arc<dyn CatalogService>,
    locks: Arc<dyn OwnerLock>,
    lock_timeout: Duration,
}

impl CartService {
    pub fn new(
        carts: Arc<dyn CartStore>,
        catalog: Arc<dyn CatalogService>,
        locks: Arc<dyn OwnerLock>,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            carts,
            catalog,
            locks,
            lock_timeout,
        }
    }

    /// Returns the owner's cart, if any.
    pub async fn get(&self, owner: &OwnerId) -> Result<Option<Cart>, CartError> {
        Ok(self.carts.read(owner).await?)
    }

    /// Replaces the owner's cart with the given items, priced by the catalog.
    ///
    /// Lines keep the order of `item_ids`; duplicates become separate lines.
    #[tracing::instrument(skip(self, item_ids), fields(items = item_ids.len()))]
    pub async fn replace(&self, owner: &OwnerId, item_ids: &[String]) -> Result<Cart, CartError> {
        let mut lines = Vec::with_capacity(item_ids.len());
        for item_id in item_ids {
            let item = self
                .catalog
                .lookup(item_id)
                .await
                .map_err(|e| match e {
                    RemoteError::NotFound(_) => CartError::UnknownItem(item_id.clone()),
                    source => CartError::Catalog {
                        item_id: item_id.clone(),
                        source,
                    },
                })?;
            lines.push(CartLine::new(item.id, item.name, item.price));
        }
        let cart = Cart::new(lines);

        let lease = self.acquire(owner).await?;
        let stored = self.carts.replace(owner, cart.clone()).await;
        release(lease).await;
        stored?;

        tracing::debug!(%owner, total = ?cart.total(), "cart replaced");
        Ok(cart)
    }

    /// Deletes the owner's cart.
    #[tracing::instrument(skip(self))]
    pub async fn clear(&self, owner: &OwnerId) -> Result<(), CartError> {
        let lease = self.acquire(owner).await?;
        let deleted = self.carts.delete(owner).await;
        release(lease).await;
        Ok(deleted?)
    }

    async fn acquire(&self, owner: &OwnerId) -> Result<OwnerLease, CartError> {
        self.locks
            .acquire(owner, self.lock_timeout)
            .await
            .map_err(|e| match e {
                StoreError::LockTimeout { owner, .. } => CartError::CheckoutInProgress { owner },
                other => CartError::Store(other),
            })
    }
}

async fn release(lease: OwnerLease) {
    let owner = lease.owner().clone();
    if let Err(e) = lease.release().await {
        tracing::warn!(%owner, error = %e, "failed to release owner lock");
    }
}
