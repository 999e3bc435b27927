//! Product route handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use losia_core::ProductId;

use crate::state::AppState;

/// Eco-impact profile for a product page.
///
/// `204 No Content` when nothing matches or the lookup fails; the block is
/// decorative and its absence is not an error for the shopper.
#[instrument(skip(state), fields(product_id = %product_id))]
pub async fn eco_impact(
    State(state): State<AppState>,
    Path(product_id): Path<ProductId>,
) -> Response {
    match state.eco_impact().resolve(&product_id).await {
        Ok(Some(profile)) => Json(profile).into_response(),
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            warn!(error = %e, "Eco-impact lookup failed");
            StatusCode::NO_CONTENT.into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DemoImageQuery {
    #[serde(default)]
    pub index: i64,
}

#[derive(Debug, Serialize)]
pub struct DemoImage {
    pub image: String,
}

/// Deterministic fallback image for a product or article without one.
pub async fn demo_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DemoImageQuery>,
) -> Json<DemoImage> {
    Json(DemoImage {
        image: state.demo_images().assign(&id, query.index).to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::config::StorefrontConfig;
    use crate::routes;

    async fn get(uri: &str) -> (StatusCode, Vec<u8>) {
        let state = AppState::from_config(StorefrontConfig::in_memory()).unwrap();
        let response = routes::app(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    #[tokio::test]
    async fn test_eco_impact_profile() {
        let (status, bytes) = get("/api/products/prd-denim-jacket/eco-impact").await;
        assert_eq!(status, StatusCode::OK);
        let profile: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(profile["group"], "Outerwear");
    }

    #[tokio::test]
    async fn test_eco_impact_unknown_is_no_content() {
        let (status, bytes) = get("/api/products/prd-unknown/eco-impact").await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn test_demo_image_is_stable() {
        let (status, first) = get("/api/demo-images/prd-linen-dress?index=2").await;
        assert_eq!(status, StatusCode::OK);
        let (_, second) = get("/api/demo-images/prd-linen-dress?index=2").await;
        assert_eq!(first, second);

        let body: Value = serde_json::from_slice(&first).unwrap();
        let image = body["image"].as_str().unwrap();
        assert!(image.starts_with("/static/images/demo/demo-"));
    }

    #[tokio::test]
    async fn test_demo_image_negative_index() {
        let (status, bytes) = get("/api/demo-images/x?index=-7").await;
        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body["image"].as_str().unwrap().ends_with(".jpg"));
    }
}
