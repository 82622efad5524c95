//! HTTP API server with observability for the checkout service.
//!
//! Provides REST endpoints for carts, checkout and orders, with structured
//! logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod extract;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{
    CartService, CatalogService, CheckoutConfig, CheckoutCoordinator, ConversionService,
    HttpCatalogClient, HttpConversionClient, HttpPaymentClient, PaymentService, RemoteError,
};
use sqlx::postgres::PgPoolOptions;
use store::{
    CartStore, InMemoryCartStore, InMemoryOrderStore, InMemoryOwnerLock, OrderStore, OwnerLock,
    PostgresOrderStore, PostgresOwnerLock, RedisCartStore, StoreError,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;

/// Storage and remote services the handlers run against.
#[derive(Clone)]
pub struct Backends {
    pub carts: Arc<dyn CartStore>,
    pub orders: Arc<dyn OrderStore>,
    pub locks: Arc<dyn OwnerLock>,
    pub catalog: Arc<dyn CatalogService>,
    pub conversion: Arc<dyn ConversionService>,
    pub payment: Arc<dyn PaymentService>,
}

/// Errors raised while connecting the backends at startup.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Failed to connect to PostgreSQL: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to build HTTP client: {0}")]
    Remote(#[from] RemoteError),
}

/// Connects the backends named by the configuration.
///
/// PostgreSQL and Redis are used when their URLs are set; otherwise orders,
/// locks and carts live in memory.
pub async fn connect_backends(config: &Config) -> Result<Backends, StartupError> {
    let http = saga::services::http_client(config.remote_timeout)?;

    let carts: Arc<dyn CartStore> = match &config.redis_url {
        Some(url) => {
            tracing::info!("using Redis cart store");
            Arc::new(RedisCartStore::connect(url).await?)
        }
        None => {
            tracing::warn!("REDIS_URL not set, carts are kept in memory");
            Arc::new(InMemoryCartStore::new())
        }
    };

    let (orders, locks): (Arc<dyn OrderStore>, Arc<dyn OwnerLock>) = match &config.database_url
    {
        Some(url) => {
            let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
            let orders = PostgresOrderStore::new(pool.clone());
            orders.run_migrations().await?;
            tracing::info!("using PostgreSQL order store and advisory locks");
            (Arc::new(orders), Arc::new(PostgresOwnerLock::new(pool)))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, orders are kept in memory");
            (
                Arc::new(InMemoryOrderStore::new()),
                Arc::new(InMemoryOwnerLock::new()),
            )
        }
    };

    Ok(Backends {
        carts,
        orders,
        locks,
        catalog: Arc::new(HttpCatalogClient::new(http.clone(), &config.catalog_url)),
        conversion: Arc::new(HttpConversionClient::new(http.clone(), &config.exchange_url)),
        payment: Arc::new(HttpPaymentClient::new(http, &config.payment_url)),
    })
}

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub carts: CartService,
    pub orders: Arc<dyn OrderStore>,
    pub coordinator: CheckoutCoordinator,
}

impl AppState {
    pub fn new(backends: Backends, config: CheckoutConfig) -> Self {
        let carts = CartService::new(
            Arc::clone(&backends.carts),
            backends.catalog,
            Arc::clone(&backends.locks),
            config.lock_timeout,
        );
        let coordinator = CheckoutCoordinator::new(
            backends.carts,
            Arc::clone(&backends.orders),
            backends.locks,
            backends.conversion,
            backends.payment,
            config,
        );

        Self {
            carts,
            orders: backends.orders,
            coordinator,
        }
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::system::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::system::health))
        .route(
            "/cart",
            get(routes::cart::get)
                .put(routes::cart::replace)
                .delete(routes::cart::delete),
        )
        .route("/cart/checkout", post(routes::checkout::checkout))
        .route("/orders", get(routes::orders::list))
        .route("/orders/{id}", get(routes::orders::get))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
