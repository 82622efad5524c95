//! Checkout saga steps.

use serde::{Deserialize, Serialize};

/// A step of the checkout saga, used to report where a checkout failed.
///
/// Step order:
/// ```text
/// AcquireLock ─► AcquireCart ─► Admission ─► CreateOrder ─► ConvertCurrency
///     ─► CapturePayment ─► SettleOrder ─► ReleaseCart
/// ```
///
/// `Reconcile` is not part of a checkout; it names the operator
/// reconciliation of a stalled order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStep {
    AcquireLock,
    AcquireCart,
    Admission,
    CreateOrder,
    ConvertCurrency,
    CapturePayment,
    SettleOrder,
    ReleaseCart,
    Reconcile,
}

impl CheckoutStep {
    /// Returns the step name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutStep::AcquireLock => "acquire_lock",
            CheckoutStep::AcquireCart => "acquire_cart",
            CheckoutStep::Admission => "admission",
            CheckoutStep::CreateOrder => "create_order",
            CheckoutStep::ConvertCurrency => "convert_currency",
            CheckoutStep::CapturePayment => "capture_payment",
            CheckoutStep::SettleOrder => "settle_order",
            CheckoutStep::ReleaseCart => "release_cart",
            CheckoutStep::Reconcile => "reconcile",
        }
    }
}

impl std::fmt::Display for CheckoutStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
