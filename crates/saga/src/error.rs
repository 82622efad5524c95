//! Checkout error types.

use std::time::Duration;

use common::{OrderId, OwnerId};
use domain::{OrderError, OrderStatus};
use store::StoreError;
use thiserror::Error;

use crate::step::CheckoutStep;

/// Errors returned by the remote catalog, conversion and payment services.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The call did not complete within the configured timeout.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The request could not be sent or the response could not be read.
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("Remote service returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body did not have the expected shape.
    #[error("Malformed response: {0}")]
    Decode(String),

    /// The requested resource does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The service refused the request.
    #[error("Rejected: {0}")]
    Rejected(String),
}

/// Errors returned by a checkout or an order reconciliation.
///
/// Every variant states what happened to the order: see
/// [`CheckoutError::order_left`].
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The owner has no cart or the cart has no lines.
    #[error("Cart of owner {owner} is empty")]
    EmptyCart { owner: OwnerId },

    /// Another checkout of the same owner holds the lock or owns the ready order.
    #[error("A checkout for owner {owner} is already in progress")]
    CheckoutInProgress { owner: OwnerId },

    /// The cart cannot be turned into an order.
    #[error("Invalid cart: {0}")]
    InvalidCart(#[from] OrderError),

    /// Currency conversion failed; the order was cancelled.
    #[error("Currency conversion failed for order {order_id}: {reason}")]
    ConversionFailed {
        order_id: OrderId,
        reason: RemoteError,
    },

    /// Payment capture failed and no charge exists; the order was cancelled.
    #[error("Payment failed for order {order_id}: {reason}")]
    PaymentFailed {
        order_id: OrderId,
        reason: RemoteError,
    },

    /// Payment capture failed and the reconciliation read failed too.
    ///
    /// The order stays ready; retrying the checkout resumes it with the same
    /// idempotency key.
    #[error(
        "Payment outcome for order {order_id} is unknown: capture failed ({charge}), reconciliation failed ({reconcile})"
    )]
    AmbiguousPaymentOutcome {
        order_id: OrderId,
        charge: RemoteError,
        reconcile: RemoteError,
    },

    /// Payment was captured but the order could not be marked settled.
    ///
    /// The order stays ready with a real charge against it. This needs
    /// operator reconciliation and is never retried automatically.
    #[error(
        "Payment {payment_reference} captured for order {order_id} but settlement was not persisted: {reason}"
    )]
    SettlementPersistFailed {
        order_id: OrderId,
        payment_reference: String,
        reason: StoreError,
    },

    /// A step failed and cancelling the order failed as well.
    #[error(
        "Step {step} failed for order {order_id} ({reason}) and the order could not be cancelled: {compensation}"
    )]
    CompensationFailed {
        order_id: OrderId,
        step: CheckoutStep,
        reason: String,
        compensation: StoreError,
    },

    /// The order to reconcile does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The payment service could not be asked about the order's charge.
    #[error("Reconciliation of order {order_id} failed: {reason}")]
    ReconciliationFailed {
        order_id: OrderId,
        reason: RemoteError,
    },

    /// A store operation failed outside of a compensated step.
    #[error("Store error during {step}: {source}")]
    Store {
        step: CheckoutStep,
        order_id: Option<OrderId>,
        source: StoreError,
    },
}

impl CheckoutError {
    pub(crate) fn store(step: CheckoutStep, order_id: Option<OrderId>, source: StoreError) -> Self {
        CheckoutError::Store {
            step,
            order_id,
            source,
        }
    }

    /// Returns the step the checkout failed in.
    pub fn step(&self) -> CheckoutStep {
        match self {
            CheckoutError::EmptyCart { .. } => CheckoutStep::AcquireCart,
            CheckoutError::CheckoutInProgress { .. } => CheckoutStep::AcquireLock,
            CheckoutError::InvalidCart(_) => CheckoutStep::CreateOrder,
            CheckoutError::ConversionFailed { .. } => CheckoutStep::ConvertCurrency,
            CheckoutError::PaymentFailed { .. }
            | CheckoutError::AmbiguousPaymentOutcome { .. } => CheckoutStep::CapturePayment,
            CheckoutError::SettlementPersistFailed { .. } => CheckoutStep::SettleOrder,
            CheckoutError::CompensationFailed { step, .. } => *step,
            CheckoutError::OrderNotFound(_) | CheckoutError::ReconciliationFailed { .. } => {
                CheckoutStep::Reconcile
            }
            CheckoutError::Store { step, .. } => *step,
        }
    }

    /// Returns the affected order, if one was created or resumed.
    pub fn order_id(&self) -> Option<OrderId> {
        match self {
            CheckoutError::EmptyCart { .. }
            | CheckoutError::CheckoutInProgress { .. }
            | CheckoutError::InvalidCart(_) => None,
            CheckoutError::ConversionFailed { order_id, .. }
            | CheckoutError::PaymentFailed { order_id, .. }
            | CheckoutError::AmbiguousPaymentOutcome { order_id, .. }
            | CheckoutError::SettlementPersistFailed { order_id, .. }
            | CheckoutError::CompensationFailed { order_id, .. }
            | CheckoutError::ReconciliationFailed { order_id, .. } => Some(*order_id),
            CheckoutError::OrderNotFound(order_id) => Some(*order_id),
            CheckoutError::Store { order_id, .. } => *order_id,
        }
    }

    /// Returns the status the affected order was left in.
    pub fn order_left(&self) -> Option<OrderStatus> {
        match self {
            CheckoutError::ConversionFailed { .. } | CheckoutError::PaymentFailed { .. } => {
                Some(OrderStatus::Cancelled)
            }
            CheckoutError::AmbiguousPaymentOutcome { .. }
            | CheckoutError::SettlementPersistFailed { .. }
            | CheckoutError::CompensationFailed { .. }
            | CheckoutError::ReconciliationFailed { .. } => Some(OrderStatus::Ready),
            CheckoutError::Store {
                order_id: Some(_), ..
            } => Some(OrderStatus::Ready),
            _ => None,
        }
    }

    /// Returns true if calling checkout again may succeed.
    ///
    /// A settlement persist failure is not retryable: the payment was
    /// captured and the order needs an operator.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            CheckoutError::EmptyCart { .. }
                | CheckoutError::InvalidCart(_)
                | CheckoutError::SettlementPersistFailed { .. }
                | CheckoutError::OrderNotFound(_)
        )
    }

    /// Returns true if a charge is known to exist for the order.
    pub fn payment_captured(&self) -> bool {
        matches!(self, CheckoutError::SettlementPersistFailed { .. })
    }

    /// Returns a stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            CheckoutError::EmptyCart { .. } => "empty_cart",
            CheckoutError::CheckoutInProgress { .. } => "checkout_in_progress",
            CheckoutError::InvalidCart(_) => "invalid_cart",
            CheckoutError::ConversionFailed { .. } => "conversion_failed",
            CheckoutError::PaymentFailed { .. } => "payment_failed",
            CheckoutError::AmbiguousPaymentOutcome { .. } => "ambiguous_payment_outcome",
            CheckoutError::SettlementPersistFailed { .. } => "settlement_persist_failed",
            CheckoutError::CompensationFailed { .. } => "compensation_failed",
            CheckoutError::OrderNotFound(_) => "order_not_found",
            CheckoutError::ReconciliationFailed { .. } => "reconciliation_failed",
            CheckoutError::Store { .. } => "store_error",
        }
    }
}

/// Errors returned by cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// The catalog does not know the item.
    #[error("Unknown item: {0}")]
    UnknownItem(String),

    /// The catalog could not be reached for an item.
    #[error("Catalog lookup for item {item_id} failed: {source}")]
    Catalog {
        item_id: String,
        source: RemoteError,
    },

    /// A checkout of the owner holds the lock.
    #[error("A checkout for owner {owner} is in progress")]
    CheckoutInProgress { owner: OwnerId },

    /// The cart store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compensated_failures_leave_order_cancelled() {
        let order_id = OrderId::new();
        let err = CheckoutError::PaymentFailed {
            order_id,
            reason: RemoteError::Rejected("card declined".to_string()),
        };

        assert_eq!(err.step(), CheckoutStep::CapturePayment);
        assert_eq!(err.order_id(), Some(order_id));
        assert_eq!(err.order_left(), Some(OrderStatus::Cancelled));
        assert!(err.is_retryable());
        assert!(!err.payment_captured());
    }

    #[test]
    fn test_settlement_persist_failure_is_not_retryable() {
        let err = CheckoutError::SettlementPersistFailed {
            order_id: OrderId::new(),
            payment_reference: "pay_1".to_string(),
            reason: StoreError::Unavailable("down".to_string()),
        };

        assert_eq!(err.step(), CheckoutStep::SettleOrder);
        assert_eq!(err.order_left(), Some(OrderStatus::Ready));
        assert!(!err.is_retryable());
        assert!(err.payment_captured());
        assert!(err.to_string().contains("pay_1"));
    }

    #[test]
    fn test_failures_before_order_have_no_order() {
        let err = CheckoutError::CheckoutInProgress {
            owner: OwnerId::new("u1"),
        };
        assert_eq!(err.order_id(), None);
        assert_eq!(err.order_left(), None);
        assert!(err.is_retryable());

        let err = CheckoutError::EmptyCart {
            owner: OwnerId::new("u1"),
        };
        assert_eq!(err.code(), "empty_cart");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_store_error_after_creation_leaves_ready() {
        let order_id = OrderId::new();
        let err = CheckoutError::store(
            CheckoutStep::ConvertCurrency,
            Some(order_id),
            StoreError::Unavailable("down".to_string()),
        );
        assert_eq!(err.order_left(), Some(OrderStatus::Ready));
        assert_eq!(err.step(), CheckoutStep::ConvertCurrency);
    }
}
