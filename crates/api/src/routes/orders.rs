//! Order read endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use common::OrderId;
use domain::{Order, OrderStatus};
use serde::Serialize;

use crate::AppState;
use crate::error::ApiError;
use crate::extract::Owner;
use crate::routes::cart::CartLineResponse;

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub owner_id: String,
    pub status: OrderStatus,
    pub total: f64,
    pub currency: String,
    pub payment_reference: Option<String>,
    pub lines: Vec<CartLineResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id().to_string(),
            owner_id: order.owner_id().to_string(),
            status: order.status(),
            total: order.total().to_major(),
            currency: order.currency().to_string(),
            payment_reference: order.payment_reference().map(str::to_string),
            lines: order.lines().iter().map(CartLineResponse::from).collect(),
            created_at: order.created_at(),
            updated_at: order.updated_at(),
        }
    }
}

/// GET /orders lists the caller's orders, newest first.
pub async fn list(
    State(state): State<Arc<AppState>>,
    Owner(owner): Owner,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state.orders.list_by_owner(&owner).await?;
    Ok(Json(orders.iter().map(OrderResponse::from).collect()))
}

/// GET /orders/{id}
///
/// Orders of other owners are reported as missing.
pub async fn get(
    State(state): State<Arc<AppState>>,
    Owner(owner): Owner,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id =
        OrderId::parse(&id).map_err(|e| ApiError::BadRequest(format!("Invalid order ID: {e}")))?;

    let order = state
        .orders
        .get(order_id)
        .await?
        .filter(|order| order.owner_id() == &owner)
        .ok_or_else(|| ApiError::NotFound(format!("Order not found: {id}")))?;

    Ok(Json(OrderResponse::from(&order)))
}
