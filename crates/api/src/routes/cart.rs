//! Cart endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use domain::CartLine;
use serde::Serialize;

use crate::AppState;
use crate::error::ApiError;
use crate::extract::Owner;

#[derive(Debug, Serialize)]
pub struct CartLineResponse {
    pub item_id: String,
    pub display_name: String,
    pub unit_price: f64,
}

impl From<&CartLine> for CartLineResponse {
    fn from(line: &CartLine) -> Self {
        Self {
            item_id: line.item_id.clone(),
            display_name: line.display_name.clone(),
            unit_price: line.unit_price.to_major(),
        }
    }
}

fn lines(lines: &[CartLine]) -> Json<Vec<CartLineResponse>> {
    Json(lines.iter().map(CartLineResponse::from).collect())
}

/// GET /cart
pub async fn get(
    State(state): State<Arc<AppState>>,
    Owner(owner): Owner,
) -> Result<Json<Vec<CartLineResponse>>, ApiError> {
    let cart = state
        .carts
        .get(&owner)
        .await?
        .ok_or_else(|| ApiError::NotFound("Cart not found".to_string()))?;
    Ok(lines(&cart.lines))
}

/// PUT /cart takes a list of catalog item IDs.
#[tracing::instrument(skip(state, item_ids), fields(owner = %owner))]
pub async fn replace(
    State(state): State<Arc<AppState>>,
    Owner(owner): Owner,
    Json(item_ids): Json<Vec<String>>,
) -> Result<Json<Vec<CartLineResponse>>, ApiError> {
    if item_ids.iter().any(|id| id.trim().is_empty()) {
        return Err(ApiError::BadRequest("Item IDs must not be blank".to_string()));
    }

    let cart = state.carts.replace(&owner, &item_ids).await?;
    Ok(lines(&cart.lines))
}

/// DELETE /cart
#[tracing::instrument(skip(state), fields(owner = %owner))]
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Owner(owner): Owner,
) -> Result<StatusCode, ApiError> {
    state.carts.clear(&owner).await?;
    Ok(StatusCode::NO_CONTENT)
}
