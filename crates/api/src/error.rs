//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::OrderStatus;
use saga::{CartError, CheckoutError};
use serde::Serialize;
use store::StoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Checkout failure.
    Checkout(CheckoutError),
    /// Cart edit failure.
    Cart(CartError),
    /// Store failure outside a checkout.
    Store(StoreError),
}

/// JSON error body.
///
/// Checkout failures also say what happened to the order so clients can
/// tell a safe retry from a captured payment.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    order_status: Option<OrderStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retryable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payment_captured: Option<bool>,
}

impl ErrorBody {
    fn simple(code: &'static str, error: String) -> Self {
        Self {
            error,
            code,
            order_id: None,
            order_status: None,
            retryable: None,
            payment_captured: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, ErrorBody::simple("not_found", msg)),
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorBody::simple("bad_request", msg),
            ),
            ApiError::Checkout(err) => checkout_error_to_response(err),
            ApiError::Cart(err) => cart_error_to_response(err),
            ApiError::Store(err) => store_error_to_response(err),
        };

        if status.is_server_error() {
            tracing::error!(code = body.code, error = %body.error, "request failed");
        }
        (status, axum::Json(body)).into_response()
    }
}

fn checkout_error_to_response(err: CheckoutError) -> (StatusCode, ErrorBody) {
    let status = match &err {
        CheckoutError::EmptyCart { .. } | CheckoutError::OrderNotFound(_) => StatusCode::NOT_FOUND,
        CheckoutError::CheckoutInProgress { .. } => StatusCode::CONFLICT,
        CheckoutError::InvalidCart(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CheckoutError::PaymentFailed { .. } => StatusCode::PAYMENT_REQUIRED,
        CheckoutError::ConversionFailed { .. }
        | CheckoutError::AmbiguousPaymentOutcome { .. }
        | CheckoutError::ReconciliationFailed { .. } => StatusCode::BAD_GATEWAY,
        CheckoutError::SettlementPersistFailed { .. } | CheckoutError::CompensationFailed { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        CheckoutError::Store { .. } => StatusCode::SERVICE_UNAVAILABLE,
    };

    let body = ErrorBody {
        error: err.to_string(),
        code: err.code(),
        order_id: err.order_id().map(|id| id.to_string()),
        order_status: err.order_left(),
        retryable: Some(err.is_retryable()),
        payment_captured: Some(err.payment_captured()),
    };
    (status, body)
}

fn cart_error_to_response(err: CartError) -> (StatusCode, ErrorBody) {
    let (status, code) = match &err {
        CartError::UnknownItem(_) => (StatusCode::NOT_FOUND, "unknown_item"),
        CartError::Catalog { .. } => (StatusCode::BAD_GATEWAY, "catalog_unavailable"),
        CartError::CheckoutInProgress { .. } => (StatusCode::CONFLICT, "checkout_in_progress"),
        CartError::Store(_) => (StatusCode::SERVICE_UNAVAILABLE, "store_error"),
    };
    (status, ErrorBody::simple(code, err.to_string()))
}

fn store_error_to_response(err: StoreError) -> (StatusCode, ErrorBody) {
    let (status, code) = match &err {
        StoreError::OrderNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        StoreError::Unavailable(_) | StoreError::Database(_) | StoreError::Cache(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "store_error")
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    };
    (status, ErrorBody::simple(code, err.to_string()))
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}

impl From<CartError> for ApiError {
    fn from(err: CartError) -> Self {
        ApiError::Cart(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}
