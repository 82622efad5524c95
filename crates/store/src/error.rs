use std::time::Duration;

use common::{OrderId, OwnerId};
use domain::OrderError;
use thiserror::Error;

/// Errors that can occur when interacting with the cart, order or lock stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The owner already has an order in the ready state.
    #[error("Owner {owner} already has a ready order")]
    ReadyOrderExists { owner: OwnerId },

    /// The per-owner lock could not be acquired in time.
    #[error("Timed out after {waited:?} waiting for the lock of owner {owner}")]
    LockTimeout { owner: OwnerId, waited: Duration },

    /// The requested change violates the order state machine.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// The backing store is unreachable or refused the operation.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A cache error occurred.
    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
