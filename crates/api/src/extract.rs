//! Request extractors.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::OwnerId;

use crate::error::ApiError;

/// Header carrying the caller's identity.
pub const OWNER_HEADER: &str = "x-user-id";

/// The authenticated owner of the request, taken from `X-User-Id`.
#[derive(Debug, Clone)]
pub struct Owner(pub OwnerId);

impl<S: Send + Sync> FromRequestParts<S> for Owner {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(OWNER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| Owner(OwnerId::new(value)))
            .ok_or_else(|| ApiError::BadRequest("Missing X-User-Id header".to_string()))
    }
}
