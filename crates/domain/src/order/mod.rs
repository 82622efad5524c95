//! Order record, status state machine and related types.

mod record;
mod state;

pub use record::{NewOrder, Order};
pub use state::OrderStatus;

use common::OrderId;
use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Order is not in a state that allows the requested transition.
    #[error("Invalid state transition for order {order_id}: cannot {action} from {current} state")]
    InvalidTransition {
        order_id: OrderId,
        current: OrderStatus,
        action: &'static str,
    },

    /// Order must carry at least one line.
    #[error("Order has no lines")]
    NoLines,

    /// A line has a negative price.
    #[error("Invalid price for item {item_id}: {cents} cents")]
    InvalidPrice { item_id: String, cents: i64 },

    /// The sum of the line prices does not fit in a `Money`.
    #[error("Order total overflows")]
    TotalOverflow,

    /// A settlement must record a non-empty payment reference.
    #[error("Payment reference must not be empty")]
    EmptyPaymentReference,

    /// A persisted status string did not match any known status.
    #[error("Unknown order status: {0}")]
    UnknownStatus(String),
}
