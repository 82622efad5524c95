//! Checkout orchestration settings.

use std::time::Duration;

use common::CurrencyCode;

/// Settings for [`CheckoutCoordinator`](crate::CheckoutCoordinator).
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    /// Currency orders are priced and stored in.
    pub settlement_currency: CurrencyCode,

    /// Currency payments are captured in.
    pub payment_currency: CurrencyCode,

    /// How long a checkout waits for the owner's lock.
    pub lock_timeout: Duration,

    /// Upper bound for each remote call.
    pub remote_timeout: Duration,

    /// Background attempts to delete the cart after a failed release.
    pub cart_release_attempts: u32,

    /// Delay before the first background attempt, doubled after each failure.
    pub cart_release_backoff: Duration,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            settlement_currency: CurrencyCode::new("EUR"),
            payment_currency: CurrencyCode::new("USD"),
            lock_timeout: Duration::from_secs(5),
            remote_timeout: Duration::from_secs(10),
            cart_release_attempts: 3,
            cart_release_backoff: Duration::from_millis(200),
        }
    }
}

impl CheckoutConfig {
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = timeout;
        self
    }

    pub fn with_cart_release_retries(mut self, attempts: u32, backoff: Duration) -> Self {
        self.cart_release_attempts = attempts;
        self.cart_release_backoff = backoff;
        self
    }
}
