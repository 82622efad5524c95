//! Working state of a single checkout.

use common::{OrderId, OwnerId};
use domain::Order;

/// The order a checkout is driving, and whether it was created by this
/// checkout or left `Ready` by an earlier one.
///
/// A resumed order may already carry a captured charge, so it is never
/// cancelled without first asking the payment service.
#[derive(Debug, Clone)]
pub struct CheckoutAttempt {
    owner: OwnerId,
    order: Order,
    resumed: bool,
}

impl CheckoutAttempt {
    pub(crate) fn fresh(owner: OwnerId, order: Order) -> Self {
        Self {
            owner,
            order,
            resumed: false,
        }
    }

    pub(crate) fn resumed(owner: OwnerId, order: Order) -> Self {
        Self {
            owner,
            order,
            resumed: true,
        }
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    pub fn order(&self) -> &Order {
        &self.order
    }

    pub fn order_id(&self) -> OrderId {
        self.order.id()
    }

    /// True when the attempt continues a ready order left by an earlier checkout.
    pub fn is_resumed(&self) -> bool {
        self.resumed
    }
}
