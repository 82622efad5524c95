//! Order record.

use chrono::{DateTime, Utc};
use common::{CurrencyCode, Money, OrderId, OwnerId};
use serde::{Deserialize, Serialize};

use crate::cart::{Cart, CartLine};

use super::{OrderError, OrderStatus};

/// Input for creating a new order from a cart snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub owner_id: OwnerId,
    pub lines: Vec<CartLine>,
    pub total: Money,
    pub currency: CurrencyCode,
}

impl NewOrder {
    /// Freezes a cart into order input, summing the line prices.
    ///
    /// Fails for an empty cart, a line with a negative price, or a total
    /// that does not fit in a `Money`.
    pub fn from_cart(
        owner_id: OwnerId,
        cart: &Cart,
        currency: CurrencyCode,
    ) -> Result<Self, OrderError> {
        if cart.is_empty() {
            return Err(OrderError::NoLines);
        }
        if let Some(line) = cart.lines.iter().find(|l| l.unit_price.is_negative()) {
            return Err(OrderError::InvalidPrice {
                item_id: line.item_id.clone(),
                cents: line.unit_price.cents(),
            });
        }

        let total = cart.total().ok_or(OrderError::TotalOverflow)?;

        Ok(Self {
            owner_id,
            lines: cart.lines.clone(),
            total,
            currency,
        })
    }
}

/// The durable record of a checkout attempt.
///
/// `lines` and `total` are frozen at creation. Only `status` and
/// `payment_reference` change afterwards, and only through [`Order::settle`]
/// and [`Order::cancel`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    owner_id: OwnerId,
    status: OrderStatus,
    payment_reference: Option<String>,
    total: Money,
    currency: CurrencyCode,
    lines: Vec<CartLine>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Order {
    /// Creates a new `Ready` order from validated input.
    pub fn create(id: OrderId, input: NewOrder, now: DateTime<Utc>) -> Self {
        Self {
            id,
            owner_id: input.owner_id,
            status: OrderStatus::Ready,
            payment_reference: None,
            total: input.total,
            currency: input.currency,
            lines: input.lines,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuilds an order from persisted fields.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: OrderId,
        owner_id: OwnerId,
        status: OrderStatus,
        payment_reference: Option<String>,
        total: Money,
        currency: CurrencyCode,
        lines: Vec<CartLine>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            owner_id,
            status,
            payment_reference,
            total,
            currency,
            lines,
            created_at,
            updated_at,
        }
    }

    /// Marks the order settled with the captured payment reference.
    pub fn settle(
        &mut self,
        payment_reference: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        if !self.status.can_settle() {
            return Err(self.invalid_transition("settle"));
        }
        let payment_reference = payment_reference.into();
        if payment_reference.trim().is_empty() {
            return Err(OrderError::EmptyPaymentReference);
        }

        self.status = OrderStatus::Settled;
        self.payment_reference = Some(payment_reference);
        self.updated_at = now;
        Ok(())
    }

    /// Marks the order cancelled.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), OrderError> {
        if !self.status.can_cancel() {
            return Err(self.invalid_transition("cancel"));
        }

        self.status = OrderStatus::Cancelled;
        self.updated_at = now;
        Ok(())
    }

    fn invalid_transition(&self, action: &'static str) -> OrderError {
        OrderError::InvalidTransition {
            order_id: self.id,
            current: self.status,
            action,
        }
    }
}

// Query methods
impl Order {
    /// Returns the order ID.
    pub fn id(&self) -> OrderId {
        self.id
    }

    /// Returns the owner of the order.
    pub fn owner_id(&self) -> &OwnerId {
        &self.owner_id
    }

    /// Returns the current status.
    pub fn status(&self) -> OrderStatus {
        self.status
    }

    /// Returns the payment reference, set only once settled.
    pub fn payment_reference(&self) -> Option<&str> {
        self.payment_reference.as_deref()
    }

    /// Returns the total fixed at creation.
    pub fn total(&self) -> Money {
        self.total
    }

    /// Returns the currency the total is expressed in.
    pub fn currency(&self) -> &CurrencyCode {
        &self.currency
    }

    /// Returns the frozen cart lines.
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    /// Returns the creation timestamp.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the timestamp of the last status change.
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns true if the order is in a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
