//! Storage collaborators consumed by the checkout saga.
//!
//! - [`CartStore`]: replace-whole-value carts keyed by owner (Redis or memory)
//! - [`OrderStore`]: durable order records (PostgreSQL or memory)
//! - [`OwnerLock`]: per-owner exclusive lock with bounded acquisition
//!   (PostgreSQL advisory locks or memory)

pub mod cache;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use cache::RedisCartStore;
pub use error::{Result, StoreError};
pub use memory::{InMemoryCartStore, InMemoryOrderStore, InMemoryOwnerLock};
pub use postgres::{PostgresOrderStore, PostgresOwnerLock};
pub use store::{CartStore, LeaseHandle, OrderStore, OwnerLease, OwnerLock};
