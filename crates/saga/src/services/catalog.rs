//! Catalog lookups used to price cart lines.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::Money;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::{decode_json, trim_base_url};
use crate::error::RemoteError;

/// A purchasable item as described by the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogItem {
    pub id: String,
    pub name: String,
    /// Price in the settlement currency.
    pub price: Money,
}

impl CatalogItem {
    pub fn new(id: impl Into<String>, name: impl Into<String>, price: Money) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            price,
        }
    }
}

/// Trait for catalog lookups.
#[async_trait]
pub trait CatalogService: Send + Sync {
    /// Looks up an item by ID.
    ///
    /// Fails with [`RemoteError::NotFound`] for unknown items.
    async fn lookup(&self, item_id: &str) -> Result<CatalogItem, RemoteError>;
}

/// In-memory catalog for testing and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalogService {
    items: Arc<RwLock<HashMap<String, CatalogItem>>>,
}

impl InMemoryCatalogService {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an item.
    pub fn insert(&self, item: CatalogItem) {
        self.items
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(item.id.clone(), item);
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with_item(self, item: CatalogItem) -> Self {
        self.insert(item);
        self
    }
}

#[async_trait]
impl CatalogService for InMemoryCatalogService {
    async fn lookup(&self, item_id: &str) -> Result<CatalogItem, RemoteError> {
        self.items
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(item_id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(format!("item {item_id}")))
    }
}

/// Catalog item as served by the catalog service.
#[derive(Debug, Deserialize)]
struct ItemPayload {
    id: String,
    book_name: String,
    /// Decimal string, e.g. `"10.00"`.
    price: String,
}

/// HTTP client for the catalog service.
///
/// Calls `GET {base_url}/_private/api/v1/books/{id}`.
#[derive(Debug, Clone)]
pub struct HttpCatalogClient {
    client: Client,
    base_url: String,
}

impl HttpCatalogClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: trim_base_url(base_url),
        }
    }
}

#[async_trait]
impl CatalogService for HttpCatalogClient {
    #[tracing::instrument(skip(self))]
    async fn lookup(&self, item_id: &str) -> Result<CatalogItem, RemoteError> {
        let url = format!("{}/_private/api/v1/books/{}", self.base_url, item_id);
        let response = self.client.get(&url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(RemoteError::NotFound(format!("item {item_id}")));
        }

        let payload: ItemPayload = decode_json(response).await?;
        let price = payload
            .price
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Money::from_major)
            .filter(|price| !price.is_negative())
            .ok_or_else(|| RemoteError::Decode(format!("invalid price {:?}", payload.price)))?;

        Ok(CatalogItem {
            id: payload.id,
            name: payload.book_name,
            price,
        })
    }
}
