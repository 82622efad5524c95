//! Checkout endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use saga::{CheckoutRequest, PaymentInstrument};
use serde::Deserialize;

use crate::AppState;
use crate::error::ApiError;
use crate::extract::Owner;
use crate::routes::orders::OrderResponse;

/// Card details. Not `Debug` so it cannot end up in logs.
#[derive(Deserialize)]
pub struct CheckoutBody {
    pub number: String,
    pub exp_date: String,
    pub cvv: String,
}

/// POST /cart/checkout checks out the caller's cart and returns the settled order.
#[tracing::instrument(skip(state, body), fields(owner = %owner))]
pub async fn checkout(
    State(state): State<Arc<AppState>>,
    Owner(owner): Owner,
    Json(body): Json<CheckoutBody>,
) -> Result<Json<OrderResponse>, ApiError> {
    if [&body.number, &body.exp_date, &body.cvv]
        .iter()
        .any(|field| field.trim().is_empty())
    {
        return Err(ApiError::BadRequest(
            "number, exp_date and cvv are required".to_string(),
        ));
    }

    let instrument = PaymentInstrument::new(body.number, body.exp_date, body.cvv);
    let order = state
        .coordinator
        .checkout(CheckoutRequest::new(owner, instrument))
        .await?;

    Ok(Json(OrderResponse::from(&order)))
}
