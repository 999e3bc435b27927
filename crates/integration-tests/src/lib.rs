//! Integration tests for Losia.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p losia-integration-tests
//! ```
//!
//! Every test drives the full axum router in-process against the in-memory
//! backend; nothing listens on a socket and no external service is needed.
//! [`TestContext`] wires the pieces and exposes the backend for setup and
//! inspection.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use serde_json::Value;
use tokio::sync::Mutex;
use tower::ServiceExt;

use losia_core::{Cart, CartId, CartItem, Money, ProductId, VariantId};
use losia_storefront::backend::{MemoryBackend, StorefrontBackend};
use losia_storefront::config::StorefrontConfig;
use losia_storefront::routes;
use losia_storefront::services::notification::NotificationError;
use losia_storefront::services::{NotificationSink, OrderNotification};
use losia_storefront::state::AppState;

/// Keeps every delivered notification.
#[derive(Debug, Default)]
pub struct RecordingSink {
    delivered: Mutex<Vec<OrderNotification>>,
}

impl RecordingSink {
    pub async fn delivered(&self) -> Vec<OrderNotification> {
        self.delivered.lock().await.clone()
    }

    /// Wait until `count` notifications have arrived, or give up after a
    /// couple of seconds.
    pub async fn wait_for(&self, count: usize) -> Vec<OrderNotification> {
        for _ in 0..200 {
            let delivered = self.delivered().await;
            if delivered.len() >= count {
                return delivered;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.delivered().await
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, notification: &OrderNotification) -> Result<(), NotificationError> {
        self.delivered.lock().await.push(notification.clone());
        Ok(())
    }
}

/// Status and JSON body of a response; `Null` for an empty body.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// A storefront wired to a seeded in-memory backend.
pub struct TestContext {
    pub app: Router,
    pub backend: Arc<MemoryBackend>,
    pub notifications: Arc<RecordingSink>,
}

impl TestContext {
    /// # Panics
    ///
    /// Panics if the in-memory state cannot be built.
    pub fn new() -> Self {
        let backend = Arc::new(MemoryBackend::seeded());
        let notifications = Arc::new(RecordingSink::default());
        let state = AppState::new(
            StorefrontConfig::in_memory(),
            StorefrontBackend::from_shared(Arc::clone(&backend)),
            notifications.clone(),
        )
        .expect("in-memory state");

        Self {
            app: routes::app(state),
            backend,
            notifications,
        }
    }

    /// Store a cart with `items` at `version`.
    pub async fn cart(&self, id: &str, items: Vec<CartItem>, version: u64) -> Cart {
        let cart = Cart {
            id: CartId::new(id),
            items,
            version,
        };
        self.backend.put_cart(cart.clone()).await;
        cart
    }

    /// Send a request with an optional JSON body.
    ///
    /// # Panics
    ///
    /// Panics if the router fails or answers with non-JSON content.
    pub async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> TestResponse {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
            .expect("request");
        let response = self.app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("JSON body")
        };
        TestResponse { status, body }
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.send("GET", uri, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> TestResponse {
        self.send("POST", uri, Some(body)).await
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// A cart line at `unit_price` with no compare-at price.
#[must_use]
pub fn line(product: &str, variant: &str, quantity: u32, unit_price: i64) -> CartItem {
    CartItem {
        product_id: ProductId::new(product),
        variant_id: VariantId::new(variant),
        quantity,
        unit_price: Money::from_units(unit_price),
        compare_at_price: None,
        size: None,
        title: None,
        image_url: None,
    }
}

/// A checkout body for a shopper in Ho Chi Minh City paying cash on delivery.
#[must_use]
pub fn checkout_body(cart_version: u64, idempotency_key: &str) -> Value {
    serde_json::json!({
        "cartVersion": cart_version,
        "customer": {"name": "Nguyen Thi Lan", "email": "lan@losia.vn", "phone": "+84 90 123 4567"},
        "address": {
            "line1": "12 Ly Tu Trong",
            "ward": "Ben Nghe",
            "district": "District 1",
            "city": "Ho Chi Minh"
        },
        "paymentMethod": "cod",
        "idempotencyKey": idempotency_key
    })
}
