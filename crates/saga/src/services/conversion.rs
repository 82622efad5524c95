//! Currency conversion service.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{CurrencyCode, Money};
use reqwest::Client;
use serde::Deserialize;

use super::{amount_from_wire, decode_json, trim_base_url};
use crate::error::RemoteError;

/// Trait for converting amounts between currencies.
#[async_trait]
pub trait ConversionService: Send + Sync {
    /// Converts `amount` from one currency to another.
    async fn convert(
        &self,
        from: &CurrencyCode,
        to: &CurrencyCode,
        amount: Money,
    ) -> Result<Money, RemoteError>;
}

#[derive(Debug)]
struct ConversionState {
    rate: RwLock<f64>,
    fail: AtomicBool,
    calls: AtomicU32,
}

/// In-memory conversion service with a single fixed rate.
///
/// Same-currency conversions return the amount unchanged.
#[derive(Debug, Clone)]
pub struct InMemoryConversionService {
    state: Arc<ConversionState>,
}

impl Default for InMemoryConversionService {
    fn default() -> Self {
        Self::with_rate(1.0)
    }
}

impl InMemoryConversionService {
    /// Creates a service converting at a 1:1 rate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a service converting at the given rate.
    pub fn with_rate(rate: f64) -> Self {
        Self {
            state: Arc::new(ConversionState {
                rate: RwLock::new(rate),
                fail: AtomicBool::new(false),
                calls: AtomicU32::new(0),
            }),
        }
    }

    /// Changes the conversion rate.
    pub fn set_rate(&self, rate: f64) {
        *self.state.rate.write().unwrap_or_else(|e| e.into_inner()) = rate;
    }

    /// Configures every conversion to fail.
    pub fn set_fail(&self, fail: bool) {
        self.state.fail.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of conversion calls made.
    pub fn call_count(&self) -> u32 {
        self.state.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConversionService for InMemoryConversionService {
    async fn convert(
        &self,
        from: &CurrencyCode,
        to: &CurrencyCode,
        amount: Money,
    ) -> Result<Money, RemoteError> {
        self.state.calls.fetch_add(1, Ordering::SeqCst);

        if self.state.fail.load(Ordering::SeqCst) {
            return Err(RemoteError::Rejected(
                "Exchange rate unavailable".to_string(),
            ));
        }
        if from == to {
            return Ok(amount);
        }

        let rate = *self.state.rate.read().unwrap_or_else(|e| e.into_inner());
        amount
            .scale(rate)
            .ok_or_else(|| RemoteError::Decode(format!("cannot convert {amount} at rate {rate}")))
    }
}

#[derive(Debug, Deserialize)]
struct ConversionPayload {
    total: f64,
}

/// HTTP client for the exchange service.
///
/// Calls `GET {base_url}/_private/api/v1/{from}/{to}/{amount}` with the
/// amount formatted to two decimals and reads `{"total": number}`.
#[derive(Debug, Clone)]
pub struct HttpConversionClient {
    client: Client,
    base_url: String,
}

impl HttpConversionClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: trim_base_url(base_url),
        }
    }
}

#[async_trait]
impl ConversionService for HttpConversionClient {
    #[tracing::instrument(skip(self), fields(amount = %amount))]
    async fn convert(
        &self,
        from: &CurrencyCode,
        to: &CurrencyCode,
        amount: Money,
    ) -> Result<Money, RemoteError> {
        let url = format!(
            "{}/_private/api/v1/{}/{}/{:.2}",
            self.base_url,
            from,
            to,
            amount.to_major()
        );
        let response = self.client.get(&url).send().await?;
        let payload: ConversionPayload = decode_json(response).await?;

        amount_from_wire(payload.total)
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn eur() -> CurrencyCode {
        "EUR".into()
    }

    fn usd() -> CurrencyCode {
        "USD".into()
    }

    #[tokio::test]
    async fn test_in_memory_applies_rate() {
        let service = InMemoryConversionService::with_rate(1.1);
        let converted = service
            .convert(&eur(), &usd(), Money::from_cents(1000))
            .await
            .unwrap();

        assert_eq!(converted, Money::from_cents(1100));
        assert_eq!(service.call_count(), 1);
    }

    #[tokio::test]
    async fn test_in_memory_same_currency_is_identity() {
        let service = InMemoryConversionService::with_rate(2.0);
        let converted = service
            .convert(&eur(), &eur(), Money::from_cents(1234))
            .await
            .unwrap();
        assert_eq!(converted, Money::from_cents(1234));
    }

    #[tokio::test]
    async fn test_in_memory_failure() {
        let service = InMemoryConversionService::new();
        service.set_fail(true);
        assert!(
            service
                .convert(&eur(), &usd(), Money::from_cents(1))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_http_convert_formats_amount() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/_private/api/v1/EUR/USD/10.00"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "total": 11.0
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpConversionClient::new(Client::new(), server.uri());
        let converted = client
            .convert(&eur(), &usd(), Money::from_cents(1000))
            .await
            .unwrap();

        assert_eq!(converted, Money::from_cents(1100));
    }

    #[tokio::test]
    async fn test_http_convert_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let client = HttpConversionClient::new(Client::new(), server.uri());
        let result = client.convert(&eur(), &usd(), Money::from_cents(1000)).await;

        match result {
            Err(RemoteError::Status { status, body }) => {
                assert_eq!(status, 503);
                assert_eq!(body, "maintenance");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_http_convert_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "rate": 1.1
            })))
            .mount(&server)
            .await;

        let client = HttpConversionClient::new(Client::new(), server.uri());
        assert!(matches!(
            client.convert(&eur(), &usd(), Money::from_cents(1000)).await,
            Err(RemoteError::Decode(_))
        ));
    }
}
