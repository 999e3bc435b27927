//! Cart route handlers.
//!
//! Every mutation opens a fresh [`CartStore`] on the authoritative cart and
//! answers with the new snapshot plus its pricing breakdown, computed by the
//! same engine checkout uses.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use losia_core::{Cart, CartId, CartKey, PricingBreakdown, ProductId, VariantId, price};

use crate::error::Result;
use crate::services::{CartStore, VoucherCheck};
use crate::state::AppState;

/// A cart and what it costs without a voucher.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub cart: Cart,
    pub pricing: PricingBreakdown,
    pub item_count: u32,
}

impl CartView {
    fn new(cart: Cart, state: &AppState) -> Self {
        let pricing = price(&cart, None, state.pricing());
        let item_count = cart.item_count();
        Self {
            cart,
            pricing,
            item_count,
        }
    }
}

/// Lines are priced from the catalog; price fields in the body are ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    pub product_id: ProductId,
    pub variant_id: VariantId,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

const fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateItemRequest {
    pub product_id: ProductId,
    pub variant_id: VariantId,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveItemRequest {
    pub product_id: ProductId,
    pub variant_id: VariantId,
}

#[derive(Debug, Deserialize)]
pub struct VoucherRequest {
    pub code: String,
}

/// A voucher outcome and the pricing it would produce.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoucherPreview {
    #[serde(flatten)]
    pub check: VoucherCheck,
    pub pricing: PricingBreakdown,
}

/// Open a store on the cart, tracked for voucher staleness.
async fn open_store(state: &AppState, cart_id: &CartId) -> Result<CartStore> {
    let backend = state.backend();
    let store = CartStore::open(backend.carts.clone(), backend.catalog.clone(), cart_id).await?;
    let tracker = state.trackers().for_cart(store.snapshot()).await;
    Ok(store.with_tracker(tracker))
}

/// Create an empty cart.
#[instrument(skip(state))]
pub async fn create(State(state): State<AppState>) -> Result<(StatusCode, Json<CartView>)> {
    let cart = state.backend().carts.create_cart().await?;
    tracing::info!(cart_id = %cart.id, "Cart created");
    Ok((StatusCode::CREATED, Json(CartView::new(cart, &state))))
}

/// Display a cart with its pricing breakdown.
#[instrument(skip(state), fields(cart_id = %cart_id))]
pub async fn show(
    State(state): State<AppState>,
    Path(cart_id): Path<CartId>,
) -> Result<Json<CartView>> {
    let store = open_store(&state, &cart_id).await?;
    Ok(Json(CartView::new(store.into_snapshot(), &state)))
}

/// Add a catalog variant, merging with an existing line for it.
#[instrument(
    skip(state, req),
    fields(cart_id = %cart_id, product_id = %req.product_id, quantity = req.quantity)
)]
pub async fn add(
    State(state): State<AppState>,
    Path(cart_id): Path<CartId>,
    Json(req): Json<AddItemRequest>,
) -> Result<Json<CartView>> {
    let key = CartKey::new(req.product_id, req.variant_id);
    let mut store = open_store(&state, &cart_id).await?;
    store.add_variant(key, req.quantity).await?;
    Ok(Json(CartView::new(store.into_snapshot(), &state)))
}

/// Set a line's quantity; zero removes it.
#[instrument(
    skip(state, req),
    fields(cart_id = %cart_id, product_id = %req.product_id, quantity = req.quantity)
)]
pub async fn update(
    State(state): State<AppState>,
    Path(cart_id): Path<CartId>,
    Json(req): Json<UpdateItemRequest>,
) -> Result<Json<CartView>> {
    let key = CartKey::new(req.product_id, req.variant_id);
    let mut store = open_store(&state, &cart_id).await?;
    store.update_quantity(&key, req.quantity).await?;
    Ok(Json(CartView::new(store.into_snapshot(), &state)))
}

/// Remove a line.
#[instrument(skip(state, req), fields(cart_id = %cart_id, product_id = %req.product_id))]
pub async fn remove(
    State(state): State<AppState>,
    Path(cart_id): Path<CartId>,
    Json(req): Json<RemoveItemRequest>,
) -> Result<Json<CartView>> {
    let key = CartKey::new(req.product_id, req.variant_id);
    let mut store = open_store(&state, &cart_id).await?;
    store.remove_item(&key).await?;
    Ok(Json(CartView::new(store.into_snapshot(), &state)))
}

/// Validate a voucher against the current cart and preview the totals.
///
/// A rejected voucher is a normal `200` answer with `ok: false`; the
/// preview then prices the cart without it.
#[instrument(skip(state, req), fields(cart_id = %cart_id))]
pub async fn apply_voucher(
    State(state): State<AppState>,
    Path(cart_id): Path<CartId>,
    Json(req): Json<VoucherRequest>,
) -> Result<Json<VoucherPreview>> {
    let backend = state.backend();
    let cart = backend.carts.fetch_cart(&cart_id).await?;
    let tracker = state.trackers().for_cart(&cart).await;

    let check = state
        .validator()
        .validate_tracked(&tracker, &req.code, &cart, None)
        .await?;
    let pricing = price(&cart, check.outcome.voucher(), state.pricing());

    Ok(Json(VoucherPreview { check, pricing }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, header};
    use losia_core::Money;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::backend::{MemoryBackend, StorefrontBackend, memory::line};
    use crate::config::StorefrontConfig;
    use crate::routes;
    use crate::services::LoggingSink;

    async fn app_with_cart() -> (axum::Router, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::seeded());
        backend
            .put_cart(Cart {
                id: CartId::new("cart-1"),
                items: vec![line("prd-linen-dress", "v-m", 1, 250_000)],
                version: 1,
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

    async fn send(
        app: &axum::Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_show_includes_pricing() {
        let (app, _) = app_with_cart().await;
        let (status, body) = send(&app, "GET", "/api/carts/cart-1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cart"]["version"], 1);
        assert_eq!(body["pricing"]["subtotal"], "250000");
        assert_eq!(body["pricing"]["shippingFee"], "30000");
        assert_eq!(body["pricing"]["total"], "280000");
        assert_eq!(body["itemCount"], 1);
    }

    #[tokio::test]
    async fn test_unknown_cart_is_404() {
        let (app, _) = app_with_cart().await;
        let (status, body) = send(&app, "GET", "/api/carts/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "NotFound");
    }

    #[tokio::test]
    async fn test_create_then_add() {
        let (app, _) = app_with_cart().await;
        let (status, created) = send(&app, "POST", "/api/carts", None).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["cart"]["id"].as_str().unwrap().to_string();

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/carts/{id}/items"),
            Some(json!({
                "productId": "prd-silk-top",
                "variantId": "v-s",
                "quantity": 2
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cart"]["items"][0]["quantity"], 2);
        assert_eq!(body["pricing"]["savings"], "60000");
    }

    #[tokio::test]
    async fn test_client_price_ignored() {
        let (app, backend) = app_with_cart().await;
        let (status, body) = send(
            &app,
            "POST",
            "/api/carts/cart-1/items",
            Some(json!({
                "productId": "prd-denim-jacket",
                "variantId": "v-l",
                "unitPrice": "1",
                "compareAtPrice": "999999999"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        // 250k dress already in the cart plus the 650k catalog jacket
        assert_eq!(body["pricing"]["subtotal"], "900000");
        assert_eq!(body["pricing"]["savings"], "0");

        let cart = backend.cart(&CartId::new("cart-1")).await.unwrap();
        let jacket = cart.find(&CartKey::new("prd-denim-jacket", "v-l")).unwrap();
        assert_eq!(jacket.unit_price, Money::from_units(650_000));
        assert!(jacket.compare_at_price.is_none());
    }

    #[tokio::test]
    async fn test_unknown_variant_is_404() {
        let (app, _) = app_with_cart().await;
        let (status, body) = send(
            &app,
            "POST",
            "/api/carts/cart-1/items",
            Some(json!({"productId": "prd-denim-jacket", "variantId": "v-xxl"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "NotFound");
    }

    #[tokio::test]
    async fn test_add_beyond_stock_is_conflict() {
        let (app, _) = app_with_cart().await;
        let (status, body) = send(
            &app,
            "POST",
            "/api/carts/cart-1/items",
            Some(json!({
                "productId": "prd-denim-jacket",
                "variantId": "v-l",
                "quantity": 2
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "InsufficientStock");
    }

    #[tokio::test]
    async fn test_patch_zero_removes_line() {
        let (app, backend) = app_with_cart().await;
        let (status, body) = send(
            &app,
            "PATCH",
            "/api/carts/cart-1/items",
            Some(json!({"productId": "prd-linen-dress", "variantId": "v-m", "quantity": 0})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cart"]["items"].as_array().unwrap().len(), 0);
        assert!(backend.cart(&CartId::new("cart-1")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_line_is_404() {
        let (app, _) = app_with_cart().await;
        let (status, _) = send(
            &app,
            "DELETE",
            "/api/carts/cart-1/items",
            Some(json!({"productId": "prd-silk-top", "variantId": "v-s"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_voucher_preview() {
        let (app, _) = app_with_cart().await;
        let (status, body) = send(
            &app,
            "POST",
            "/api/carts/cart-1/voucher",
            Some(json!({"code": " sale10 "})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"]["ok"], true);
        assert_eq!(body["cartVersion"], 1);
        assert_eq!(body["pricing"]["discount"], "25000");
        assert_eq!(body["pricing"]["total"], "255000");
    }

    #[tokio::test]
    async fn test_rejected_voucher_prices_without_discount() {
        let (app, _) = app_with_cart().await;
        let (status, body) = send(
            &app,
            "POST",
            "/api/carts/cart-1/voucher",
            Some(json!({"code": "EXPIRED10"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"]["ok"], false);
        assert_eq!(body["pricing"]["discount"], "0");
        assert_eq!(body["pricing"]["total"], "280000");
    }
}
