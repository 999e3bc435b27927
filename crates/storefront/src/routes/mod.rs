//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                               - Health check
//!
//! # Cart
//! POST   /api/carts                            - Create cart
//! GET    /api/carts/{cart_id}                  - Cart + pricing breakdown
//! POST   /api/carts/{cart_id}/items            - Add item
//! PATCH  /api/carts/{cart_id}/items            - Update quantity (0 removes)
//! DELETE /api/carts/{cart_id}/items            - Remove item
//! POST   /api/carts/{cart_id}/voucher          - Validate voucher, preview pricing
//!
//! # Checkout
//! POST   /api/carts/{cart_id}/checkout         - Submit order
//!
//! # Products
//! GET    /api/products/{product_id}/eco-impact - Eco-impact profile or 204
//! GET    /api/demo-images/{id}?index=N         - Fallback image path
//! ```

pub mod cart;
pub mod checkout;
pub mod products;

use axum::{
    Router,
    middleware::from_fn,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::middleware::request_id_middleware;
use crate::state::AppState;

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(cart::create))
        .route("/{cart_id}", get(cart::show))
        .route(
            "/{cart_id}/items",
            post(cart::add).patch(cart::update).delete(cart::remove),
        )
        .route("/{cart_id}/voucher", post(cart::apply_voucher))
        .route("/{cart_id}/checkout", post(checkout::submit))
}

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new().route("/{product_id}/eco-impact", get(products::eco_impact))
}

/// Create all API routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/api/carts", cart_routes())
        .nest("/api/products", product_routes())
        .route("/api/demo-images/{id}", get(products::demo_image))
}

/// The full application: routes, health check, tracing and request IDs.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(routes())
        .with_state(state)
        .layer(from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::config::StorefrontConfig;
    use crate::middleware::REQUEST_ID_HEADER;

    #[tokio::test]
    async fn test_health() {
        let state = AppState::from_config(StorefrontConfig::in_memory()).unwrap();
        let response = app(state)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"ok");
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let state = AppState::from_config(StorefrontConfig::in_memory()).unwrap();
        let response = app(state)
            .oneshot(Request::builder().uri("/api/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
