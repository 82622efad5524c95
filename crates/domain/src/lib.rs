//! Domain layer for the checkout service.
//!
//! This crate provides the core domain types:
//! - `Cart` and `CartLine`, the priced, replace-whole-value cart
//! - `Order`, the durable record of a checkout attempt
//! - `OrderStatus`, the `READY -> SETTLED | CANCELLED` state machine

pub mod cart;
pub mod order;

pub use cart::{Cart, CartLine};
pub use common::{CurrencyCode, Money, OrderId, OwnerId};
pub use order::{NewOrder, Order, OrderError, OrderStatus};
