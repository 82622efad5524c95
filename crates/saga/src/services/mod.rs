//! Remote service traits with in-memory and HTTP implementations.

pub mod catalog;
pub mod conversion;
pub mod payment;

use std::time::Duration;

use common::Money;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::RemoteError;

pub use catalog::{CatalogItem, CatalogService, HttpCatalogClient, InMemoryCatalogService};
pub use conversion::{ConversionService, HttpConversionClient, InMemoryConversionService};
pub use payment::{
    ChargeRequest, HttpPaymentClient, IdempotencyKey, InMemoryPaymentService, PaymentInstrument,
    PaymentResult, PaymentService,
};

/// Builds the HTTP client shared by the remote service clients.
pub fn http_client(timeout: Duration) -> Result<Client, RemoteError> {
    let client = Client::builder()
        .timeout(timeout)
        .user_agent(concat!("checkout-service/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// Decodes a JSON response body, turning non-success statuses into errors.
pub(crate) async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T, RemoteError> {
    let status = response.status();
    if !status.is_success() {
        return Err(status_error(status, response).await);
    }

    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| RemoteError::Decode(e.to_string()))
}

pub(crate) async fn status_error(status: StatusCode, response: Response) -> RemoteError {
    let body = response.text().await.unwrap_or_default();
    RemoteError::Status {
        status: status.as_u16(),
        body,
    }
}

/// Converts a major-unit amount from the wire into money.
pub(crate) fn amount_from_wire(value: f64) -> Result<Money, RemoteError> {
    match Money::from_major(value) {
        Some(money) if !money.is_negative() => Ok(money),
        _ => Err(RemoteError::Decode(format!("invalid amount {value}"))),
    }
}

pub(crate) fn trim_base_url(base_url: impl Into<String>) -> String {
    base_url.into().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_from_wire() {
        assert_eq!(amount_from_wire(11.0).unwrap(), Money::from_cents(1100));
        assert!(amount_from_wire(-1.0).is_err());
        assert!(amount_from_wire(f64::NAN).is_err());
    }

    #[test]
    fn test_trim_base_url() {
        assert_eq!(trim_base_url("http://x:1/"), "http://x:1");
        assert_eq!(trim_base_url("http://x:1"), "http://x:1");
    }
}
