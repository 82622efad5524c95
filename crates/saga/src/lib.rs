//! Checkout saga for turning a cart into a paid order.
//!
//! The checkout saga follows these steps under a per-owner lock:
//! 1. Acquire the cart
//! 2. Admission check (resume a stalled ready order instead of creating one)
//! 3. Create the order in the ready state
//! 4. Convert the total to the payment currency
//! 5. Capture payment with an idempotency key derived from the order
//! 6. Settle the order
//! 7. Release the cart
//!
//! Failures in steps 4 and 5 cancel the order and leave the cart intact.
//! A failed capture is reconciled once against the payment service before
//! cancelling, so a charge that went through is settled instead of orphaned.

pub mod admission;
pub mod attempt;
pub mod cart;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod services;
pub mod step;

pub use admission::Admission;
pub use attempt::CheckoutAttempt;
pub use cart::CartService;
pub use config::CheckoutConfig;
pub use coordinator::{CheckoutCoordinator, CheckoutRequest, ReconcileOutcome};
pub use error::{CartError, CheckoutError, RemoteError};
pub use services::{
    CatalogItem, CatalogService, ChargeRequest, ConversionService, HttpCatalogClient,
    HttpConversionClient, HttpPaymentClient, IdempotencyKey, InMemoryCatalogService,
    InMemoryConversionService, InMemoryPaymentService, PaymentInstrument, PaymentResult,
    PaymentService,
};
pub use step::CheckoutStep;
