//! Checkout route handler.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use losia_core::{
    CartId, CustomerContact, IdempotencyKey, Money, Order, OrderId, OrderStatus, PaymentMethod,
    PricingBreakdown, ShippingAddress,
};

use crate::error::{AppError, Result, add_breadcrumb};
use crate::services::{CartError, CheckoutRequest, VoucherClaim};
use crate::state::AppState;

/// Raw contact fields as typed into the checkout form.
#[derive(Debug, Deserialize)]
pub struct ContactForm {
    pub name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutBody {
    /// Version of the cart the shopper reviewed.
    pub cart_version: u64,
    #[serde(default)]
    pub voucher: Option<VoucherClaim>,
    pub customer: ContactForm,
    pub address: ShippingAddress,
    pub payment_method: PaymentMethod,
    /// Repeat the key from a failed attempt to retry it safely.
    #[serde(default)]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub expected_total: Option<Money>,
}

/// What the shopper sees once an order is placed.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    pub order_id: OrderId,
    pub code: String,
    pub status: OrderStatus,
    pub totals: PricingBreakdown,
    pub payment_method: PaymentMethod,
    pub idempotency_key: IdempotencyKey,
}

impl From<Order> for OrderView {
    fn from(order: Order) -> Self {
        Self {
            totals: *order.draft.totals(),
            payment_method: order.draft.payment_method(),
            idempotency_key: order.draft.idempotency_key().clone(),
            order_id: order.id,
            code: order.code,
            status: order.status,
        }
    }
}

/// Submit the cart as an order.
///
/// The cart is re-read from the cart service; if it moved past the version
/// the shopper reviewed, the request fails with `409 ConcurrencyConflict`.
#[instrument(skip(state, body), fields(cart_id = %cart_id, cart_version = body.cart_version))]
pub async fn submit(
    State(state): State<AppState>,
    Path(cart_id): Path<CartId>,
    Json(body): Json<CheckoutBody>,
) -> Result<(StatusCode, Json<OrderView>)> {
    // A blank key means "start a new attempt"; anything else must be well formed.
    let idempotency_key = body
        .idempotency_key
        .as_deref()
        .filter(|k| !k.trim().is_empty())
        .map(IdempotencyKey::parse)
        .transpose()
        .map_err(|e| AppError::InvalidInput(e.to_string()))?;

    // A retry of an attempt that already succeeded; the cart has moved on.
    if let Some(key) = &idempotency_key
        && let Some(order) = state.checkout().completed_order(key).await
    {
        return Ok((StatusCode::CREATED, Json(order.into())));
    }

    let customer =
        CustomerContact::parse(&body.customer.name, &body.customer.email, &body.customer.phone)
            .map_err(|e| AppError::InvalidInput(e.to_string()))?;

    let cart = state.backend().carts.fetch_cart(&cart_id).await?;
    if cart.version != body.cart_version {
        return Err(CartError::ConcurrencyConflict {
            expected: body.cart_version,
            current: Some(cart.version),
        }
        .into());
    }

    let order = state
        .checkout()
        .submit(CheckoutRequest {
            cart,
            voucher: body.voucher,
            customer,
            address: body.address,
            payment_method: body.payment_method,
            idempotency_key,
            expected_total: body.expected_total,
        })
        .await?;

    add_breadcrumb(
        "checkout",
        "Order placed",
        Some(&[("order_code", order.code.as_str())]),
    );
    Ok((StatusCode::CREATED, Json(order.into())))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, header};
    use losia_core::Cart;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::backend::{MemoryBackend, StorefrontBackend, memory::line};
    use crate::config::StorefrontConfig;
    use crate::routes;
    use crate::services::LoggingSink;

    async fn app() -> (axum::Router, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::seeded());
        backend
            .put_cart(Cart {
                id: CartId::new("cart-1"),
                items: vec![line("prd-linen-dress", "v-m", 2, 250_000)],
                version: 4,
            })
            .await;
        let state = AppState::new(
            StorefrontConfig::in_memory(),
            StorefrontBackend::from_shared(backend.clone()),
            Arc::new(LoggingSink),
        )
        .unwrap();
        (routes::app(state), backend)
    }

    fn body(version: u64) -> Value {
        json!({
            "cartVersion": version,
            "customer": {"name": "Lan", "email": "lan@losia.vn", "phone": "0901234567"},
            "address": {"line1": "12 Ly Tu Trong", "district": "District 1", "city": "Ho Chi Minh"},
            "paymentMethod": "cod",
            "idempotencyKey": "attempt-1"
        })
    }

    async fn post(app: &axum::Router, payload: &Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/api/carts/cart-1/checkout")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_checkout_creates_order() {
        let (app, backend) = app().await;
        let (status, order) = post(&app, &body(4)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(order["status"], "created");
        // 500k reaches the free-shipping threshold
        assert_eq!(order["totals"]["shippingFee"], "0");
        assert_eq!(order["totals"]["total"], "500000");
        assert_eq!(order["idempotencyKey"], "attempt-1");
        assert_eq!(backend.orders().await.len(), 1);
    }

    #[tokio::test]
    async fn test_outdated_version_is_conflict() {
        let (app, backend) = app().await;
        let (status, err) = post(&app, &body(3)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(err["error"], "ConcurrencyConflict");
        assert!(backend.orders().await.is_empty());
    }

    #[tokio::test]
    async fn test_bad_email_is_unprocessable() {
        let (app, _) = app().await;
        let mut payload = body(4);
        payload["customer"]["email"] = json!("not-an-email");
        let (status, err) = post(&app, &payload).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err["error"], "InvalidInput");
    }

    #[tokio::test]
    async fn test_repeat_after_success_returns_same_order() {
        let (app, backend) = app().await;
        let (_, first) = post(&app, &body(4)).await;
        // the cart was cleared and moved to v5; the retry still answers
        let (status, second) = post(&app, &body(4)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(first["code"], second["code"]);
        assert_eq!(backend.orders().await.len(), 1);
    }
    #[tokio::test]
    async fn test_malformed_idempotency_key_is_unprocessable() {
        let (app, backend) = app().await;
        for key in [json!("attempt 1; drop"), json!("k".repeat(129))] {
            let mut payload = body(4);
            payload["idempotencyKey"] = key;
            let (status, err) = post(&app, &payload).await;
            assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
            assert_eq!(err["error"], "InvalidInput");
        }
        assert!(backend.orders().await.is_empty());
    }

    #[tokio::test]
    async fn test_blank_idempotency_key_starts_new_attempt() {
        let (app, _) = app().await;
        let mut payload = body(4);
        payload["idempotencyKey"] = json!("   ");
        let (status, order) = post(&app, &payload).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(order["idempotencyKey"].as_str().map(str::len), Some(36));
    }
}
