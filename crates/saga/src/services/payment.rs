//! Payment service trait, in-memory implementation and HTTP client.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use common::{CurrencyCode, Money, OrderId};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::{decode_json, status_error, trim_base_url};
use crate::error::RemoteError;

/// Idempotency key sent with every capture.
///
/// Derived from the order ID so that every attempt for the same order,
/// including resumed checkouts, reuses the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn for_order(order_id: OrderId) -> Self {
        Self(format!("order-{order_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Card details supplied with a checkout.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct PaymentInstrument {
    pub card_number: String,
    pub exp_date: String,
    pub cvv: String,
}

impl PaymentInstrument {
    pub fn new(
        card_number: impl Into<String>,
        exp_date: impl Into<String>,
        cvv: impl Into<String>,
    ) -> Self {
        Self {
            card_number: card_number.into(),
            exp_date: exp_date.into(),
            cvv: cvv.into(),
        }
    }

    fn last_four(&self) -> &str {
        let len = self.card_number.len();
        self.card_number.get(len.saturating_sub(4)..).unwrap_or("")
    }
}

// Card data must never reach logs.
impl std::fmt::Debug for PaymentInstrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentInstrument")
            .field("card_number", &format_args!("****{}", self.last_four()))
            .field("exp_date", &"**/**")
            .field("cvv", &"***")
            .finish()
    }
}

/// A capture request.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub amount: Money,
    pub currency: CurrencyCode,
    pub instrument: PaymentInstrument,
    pub idempotency_key: IdempotencyKey,
}

/// Result of a successful payment charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentResult {
    /// The payment ID assigned by the payment service.
    pub payment_id: String,
}

/// Trait for payment processing operations.
///
/// The payment service deduplicates captures by idempotency key: charging
/// twice with the same key returns the first charge.
#[async_trait]
pub trait PaymentService: Send + Sync {
    /// Captures a payment.
    async fn charge(&self, request: &ChargeRequest) -> Result<PaymentResult, RemoteError>;

    /// Looks up the charge made with the given idempotency key, if any.
    async fn reconcile(&self, key: &IdempotencyKey) -> Result<Option<PaymentResult>, RemoteError>;
}

#[derive(Debug, Clone)]
struct Charge {
    payment_id: String,
    amount: Money,
    currency: CurrencyCode,
}

#[derive(Debug, Default)]
struct InMemoryPaymentState {
    charges: HashMap<IdempotencyKey, Charge>,
    next_id: u32,
    charge_calls: u32,
    fail_on_charge: bool,
    fail_after_capture: bool,
    fail_on_reconcile: bool,
    charge_delay: Option<Duration>,
}

/// In-memory payment service for testing.
///
/// Payment IDs are `pay_1`, `pay_2`, ... in capture order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentService {
    state: Arc<Mutex<InMemoryPaymentState>>,
}

impl InMemoryPaymentService {
    /// Creates a new in-memory payment service.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, InMemoryPaymentState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Configures charges to be declined without capturing.
    pub fn set_fail_on_charge(&self, fail: bool) {
        self.state().fail_on_charge = fail;
    }

    /// Configures charges to capture and then report an error.
    pub fn set_fail_after_capture(&self, fail: bool) {
        self.state().fail_after_capture = fail;
    }

    /// Configures reconciliation reads to fail.
    pub fn set_fail_on_reconcile(&self, fail: bool) {
        self.state().fail_on_reconcile = fail;
    }

    /// Delays every charge response. The capture is recorded before the delay.
    pub fn set_charge_delay(&self, delay: Option<Duration>) {
        self.state().charge_delay = delay;
    }

    /// Returns the number of captured payments.
    pub fn payment_count(&self) -> usize {
        self.state().charges.len()
    }

    /// Returns the number of charge calls received, including duplicates.
    pub fn charge_calls(&self) -> u32 {
        self.state().charge_calls
    }

    /// Returns true if a payment exists with the given ID.
    pub fn has_payment(&self, payment_id: &str) -> bool {
        self.state()
            .charges
            .values()
            .any(|c| c.payment_id == payment_id)
    }

    /// Returns the amount and currency captured under the given key.
    pub fn captured(&self, key: &IdempotencyKey) -> Option<(Money, CurrencyCode)> {
        self.state()
            .charges
            .get(key)
            .map(|c| (c.amount, c.currency.clone()))
    }
}

#[async_trait]
impl PaymentService for InMemoryPaymentService {
    async fn charge(&self, request: &ChargeRequest) -> Result<PaymentResult, RemoteError> {
        let (payment_id, fail_after_capture, delay) = {
            let mut state = self.state();
            state.charge_calls += 1;

            if state.fail_on_charge {
                return Err(RemoteError::Rejected("Payment declined".to_string()));
            }

            let payment_id = match state.charges.get(&request.idempotency_key) {
                Some(existing) => existing.payment_id.clone(),
                None => {
                    state.next_id += 1;
                    let payment_id = format!("pay_{}", state.next_id);
                    state.charges.insert(
                        request.idempotency_key.clone(),
                        Charge {
                            payment_id: payment_id.clone(),
                            amount: request.amount,
                            currency: request.currency.clone(),
                        },
                    );
                    payment_id
                }
            };
            (payment_id, state.fail_after_capture, state.charge_delay)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail_after_capture {
            return Err(RemoteError::Status {
                status: 504,
                body: "upstream timed out".to_string(),
            });
        }

        Ok(PaymentResult { payment_id })
    }

    async fn reconcile(&self, key: &IdempotencyKey) -> Result<Option<PaymentResult>, RemoteError> {
        let state = self.state();
        if state.fail_on_reconcile {
            return Err(RemoteError::Rejected(
                "Payment lookup unavailable".to_string(),
            ));
        }

        Ok(state.charges.get(key).map(|c| PaymentResult {
            payment_id: c.payment_id.clone(),
        }))
    }
}

#[derive(Debug, Serialize)]
struct ChargePayload<'a> {
    amount: f64,
    currency: &'a str,
    card_number: &'a str,
    exp_date: &'a str,
    cvv: &'a str,
}

#[derive(Debug, Deserialize)]
struct PaymentPayload {
    id: String,
}

impl PaymentPayload {
    fn into_result(self) -> Result<PaymentResult, RemoteError> {
        let payment_id = self.id.trim();
        if payment_id.is_empty() {
            return Err(RemoteError::Decode("blank payment id".to_string()));
        }
        Ok(PaymentResult {
            payment_id: payment_id.to_string(),
        })
    }
}

/// HTTP client for the payment service.
///
/// Captures with `POST {base_url}/_private/api/v1/payment` carrying an
/// `Idempotency-Key` header, and reconciles with
/// `GET {base_url}/_private/api/v1/payment/{key}` (404 when no charge exists).
#[derive(Debug, Clone)]
pub struct HttpPaymentClient {
    client: Client,
    base_url: String,
}

impl HttpPaymentClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: trim_base_url(base_url),
        }
    }
}

#[async_trait]
impl PaymentService for HttpPaymentClient {
    #[tracing::instrument(skip(self, request), fields(key = %request.idempotency_key, amount = %request.amount))]
    async fn charge(&self, request: &ChargeRequest) -> Result<PaymentResult, RemoteError> {
        let payload = ChargePayload {
            amount: request.amount.to_major(),
            currency: request.currency.as_str(),
            card_number: &request.instrument.card_number,
            exp_date: &request.instrument.exp_date,
            cvv: &request.instrument.cvv,
        };

        let response = self
            .client
            .post(format!("{}/_private/api/v1/payment", self.base_url))
            .header("Idempotency-Key", request.idempotency_key.as_str())
            .json(&payload)
            .send()
            .await?;

        decode_json::<PaymentPayload>(response).await?.into_result()
    }

    #[tracing::instrument(skip(self))]
    async fn reconcile(&self, key: &IdempotencyKey) -> Result<Option<PaymentResult>, RemoteError> {
        let response = self
            .client
            .get(format!("{}/_private/api/v1/payment/{}", self.base_url, key))
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let body: PaymentPayload = decode_json(response).await?;
                body.into_result().map(Some)
            }
            status => Err(status_error(status, response).await),
        }
    }
}
