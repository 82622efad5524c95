//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use api::{AppState, Backends};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::Money;
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{
    CatalogItem, CheckoutConfig, InMemoryCatalogService, InMemoryConversionService,
    InMemoryPaymentService,
};
use store::{InMemoryCartStore, InMemoryOrderStore, InMemoryOwnerLock};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    app: axum::Router,
    orders: InMemoryOrderStore,
    payment: InMemoryPaymentService,
}

fn setup() -> TestApp {
    let orders = InMemoryOrderStore::new();
    let payment = InMemoryPaymentService::new();
    let catalog = InMemoryCatalogService::new()
        .with_item(CatalogItem::new("b1", "Dune", Money::from_cents(1000)))
        .with_item(CatalogItem::new("b2", "Emma", Money::from_cents(550)));

    let backends = Backends {
        carts: Arc::new(InMemoryCartStore::new()),
        orders: Arc::new(orders.clone()),
        locks: Arc::new(InMemoryOwnerLock::new()),
        catalog: Arc::new(catalog),
        conversion: Arc::new(InMemoryConversionService::with_rate(1.1)),
        payment: Arc::new(payment.clone()),
    };
    let state = Arc::new(AppState::new(backends, CheckoutConfig::default()));

    TestApp {
        app: api::create_app(state, get_metrics_handle()),
        orders,
        payment,
    }
}

fn request(method: &str, uri: &str, user: Option<&str>, body: Option<serde_json::Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("X-User-Id", user);
    }
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&json).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &axum::Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

fn card() -> serde_json::Value {
    serde_json::json!({ "number": "4242424242424242", "exp_date": "12/30", "cvv": "123" })
}

async fn put_cart(app: &axum::Router, user: &str, items: &[&str]) {
    let (status, _) = send(
        app,
        request("PUT", "/cart", Some(user), Some(serde_json::json!(items))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_health_check() {
    let t = setup();

    let (status, json) = send(&t.app, request("GET", "/health", None, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let t = setup();

    let response = t
        .app
        .clone()
        .oneshot(request("GET", "/metrics", None, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn test_missing_owner_header_is_rejected() {
    let t = setup();

    let (status, json) = send(&t.app, request("GET", "/cart", None, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "bad_request");

    let (status, _) = send(&t.app, request("GET", "/orders", Some("  "), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cart_lifecycle() {
    let t = setup();

    let (status, _) = send(&t.app, request("GET", "/cart", Some("u1"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    put_cart(&t.app, "u1", &["b1", "b2"]).await;

    let (status, json) = send(&t.app, request("GET", "/cart", Some("u1"), None)).await;
    assert_eq!(status, StatusCode::OK);
    let lines = json.as_array().unwrap();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["item_id"], "b1");
    assert_eq!(lines[0]["display_name"], "Dune");
    assert_eq!(lines[0]["unit_price"], 10.0);
    assert_eq!(lines[1]["unit_price"], 5.5);

    // Carts are per owner
    let (status, _) = send(&t.app, request("GET", "/cart", Some("u2"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    for _ in 0..2 {
        let (status, _) = send(&t.app, request("DELETE", "/cart", Some("u1"), None)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }
    let (status, _) = send(&t.app, request("GET", "/cart", Some("u1"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_item_is_rejected() {
    let t = setup();

    let (status, json) = send(
        &t.app,
        request(
            "PUT",
            "/cart",
            Some("u1"),
            Some(serde_json::json!(["b1", "missing"])),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "unknown_item");
}

#[tokio::test]
async fn test_checkout_settles_order() {
    let t = setup();
    put_cart(&t.app, "u1", &["b1"]).await;

    let (status, json) = send(
        &t.app,
        request("POST", "/cart/checkout", Some("u1"), Some(card())),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "settled");
    assert_eq!(json["total"], 10.0);
    assert_eq!(json["currency"], "EUR");
    assert_eq!(json["payment_reference"], "pay_1");
    assert_eq!(json["lines"].as_array().unwrap().len(), 1);

    // The cart is released
    let (status, _) = send(&t.app, request("GET", "/cart", Some("u1"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // The order is listed and readable by its owner only
    let order_id = json["id"].as_str().unwrap().to_string();
    let (status, list) = send(&t.app, request("GET", "/orders", Some("u1"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);

    let uri = format!("/orders/{order_id}");
    let (status, detail) = send(&t.app, request("GET", &uri, Some("u1"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["id"], order_id.as_str());

    let (status, _) = send(&t.app, request("GET", &uri, Some("u2"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_checkout_empty_cart() {
    let t = setup();

    let (status, json) = send(
        &t.app,
        request("POST", "/cart/checkout", Some("u1"), Some(card())),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "empty_cart");
    assert_eq!(json["retryable"], false);
    assert!(json.get("order_id").is_none());
    assert_eq!(t.orders.order_count().await, 0);
}

#[tokio::test]
async fn test_checkout_requires_card_fields() {
    let t = setup();
    put_cart(&t.app, "u1", &["b1"]).await;

    let (status, _) = send(
        &t.app,
        request(
            "POST",
            "/cart/checkout",
            Some("u1"),
            Some(serde_json::json!({ "number": "4242424242424242", "exp_date": "", "cvv": "123" })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(t.payment.charge_calls(), 0);
}

#[tokio::test]
async fn test_declined_payment_reports_cancelled_order() {
    let t = setup();
    put_cart(&t.app, "u1", &["b1"]).await;
    t.payment.set_fail_on_charge(true);

    let (status, json) = send(
        &t.app,
        request("POST", "/cart/checkout", Some("u1"), Some(card())),
    )
    .await;

    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(json["code"], "payment_failed");
    assert_eq!(json["order_status"], "cancelled");
    assert_eq!(json["retryable"], true);
    assert_eq!(json["payment_captured"], false);
    assert!(json["order_id"].as_str().is_some());

    // The cart is kept for a retry
    let (status, _) = send(&t.app, request("GET", "/cart", Some("u1"), None)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_settlement_failure_reports_captured_payment() {
    let t = setup();
    put_cart(&t.app, "u1", &["b1"]).await;
    t.orders.set_fail_on_settle(true);

    let (status, json) = send(
        &t.app,
        request("POST", "/cart/checkout", Some("u1"), Some(card())),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "settlement_persist_failed");
    assert_eq!(json["order_status"], "ready");
    assert_eq!(json["retryable"], false);
    assert_eq!(json["payment_captured"], true);
}

#[tokio::test]
async fn test_invalid_order_id() {
    let t = setup();

    let (status, _) = send(
        &t.app,
        request("GET", "/orders/not-a-uuid", Some("u1"), None),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}
