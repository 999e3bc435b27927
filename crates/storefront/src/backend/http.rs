//! Commerce backend client over JSON/HTTP.
//!
//! Uses `reqwest` 0.13 with a bearer token. Caches catalog taxonomy and
//! eco-impact lookups using `moka` (5-minute TTL); carts, vouchers and
//! orders are never cached.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use losia_core::{
    Cart, CartId, CartKey, EcoImpactProfile, ProductId, ProductTaxonomy, VoucherOutcome,
};

use super::types::{
    CartEnvelope, CartLineRequest, CatalogVariant, ErrorBody, OrderReceipt, OrderSubmission,
    StockResponse, VoucherValidationRequest,
};
use super::{
    BackendError, CartMutation, CartService, Catalog, EcoImpactSource, OrderStore, VoucherRules,
};

/// Header carrying the checkout attempt's idempotency key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// Cached read-only lookups. Misses are cached too.
#[derive(Debug, Clone)]
enum CacheValue {
    Taxonomy(Option<Box<ProductTaxonomy>>),
    EcoImpact(Option<Box<EcoImpactProfile>>),
}

// =============================================================================
// HttpBackend
// =============================================================================

/// Client for the commerce backend.
///
/// Implements every collaborator trait against the backend's JSON API.
#[derive(Clone)]
pub struct HttpBackend {
    inner: Arc<HttpBackendInner>,
}

struct HttpBackendInner {
    client: reqwest::Client,
    base_url: Url,
    token: SecretString,
    cache: Cache<String, CacheValue>,
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackend")
            .field("base_url", &self.inner.base_url.as_str())
            .field("token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl HttpBackend {
    /// Create a new backend client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        base_url: Url,
        token: SecretString,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            inner: Arc::new(HttpBackendInner {
                client,
                base_url,
                token,
                cache,
            }),
        })
    }

    /// Build `{base}/{segments...}` with each segment percent-encoded.
    fn url(&self, segments: &[&str]) -> Result<Url, BackendError> {
        let mut url = self.inner.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| BackendError::Unavailable("backend URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, BackendError> {
        let url = self.url(segments)?;
        Ok(self
            .inner
            .client
            .request(method, url)
            .bearer_auth(self.inner.token.expose_secret())
            .header("Accept", "application/json"))
    }

    /// Send a request and decode the JSON body.
    async fn execute<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, BackendError> {
        let response = request.send().await?;
        let status = response.status();

        // Check for rate limiting
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(BackendError::RateLimited(retry_after));
        }

        // Get response body as text first for better error diagnostics
        let response_text = response.text().await?;

        if !status.is_success() {
            return Err(status_error(status, &response_text));
        }

        serde_json::from_str(&response_text).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %response_text.chars().take(500).collect::<String>(),
                "Failed to parse backend response"
            );
            BackendError::Parse(e)
        })
    }
}

/// Map a non-success status and its body to a [`BackendError`].
fn status_error(status: StatusCode, body: &str) -> BackendError {
    let snippet: String = body.chars().take(200).collect();

    if status.is_server_error() {
        tracing::error!(
            status = %status,
            body = %body.chars().take(500).collect::<String>(),
            "Backend returned server error"
        );
        return BackendError::Unavailable(format!("HTTP {status}: {snippet}"));
    }

    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let reason = parsed
        .reason
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown").to_string());

    match status {
        StatusCode::NOT_FOUND => BackendError::NotFound(reason),
        StatusCode::CONFLICT => BackendError::Conflict {
            reason,
            current_version: parsed.current_version,
        },
        _ => {
            tracing::warn!(status = %status, reason = %reason, "Backend rejected request");
            BackendError::Rejected {
                status: status.as_u16(),
                reason,
                details: parsed.details,
            }
        }
    }
}

// =============================================================================
// Cart Methods
// =============================================================================

#[async_trait]
impl CartService for HttpBackend {
    #[instrument(skip(self))]
    async fn create_cart(&self) -> Result<Cart, BackendError> {
        let request = self.request(Method::POST, &["carts"])?;
        let envelope: CartEnvelope = self.execute(request).await?;
        Ok(envelope.into())
    }

    #[instrument(skip(self), fields(cart_id = %id))]
    async fn fetch_cart(&self, id: &CartId) -> Result<Cart, BackendError> {
        let request = self.request(Method::GET, &["carts", id.as_str()])?;
        let envelope: CartEnvelope = self.execute(request).await?;
        Ok(envelope.into())
    }

    #[instrument(skip(self, mutation), fields(cart_id = %id))]
    async fn mutate_cart(
        &self,
        id: &CartId,
        expected_version: u64,
        mutation: CartMutation,
    ) -> Result<Cart, BackendError> {
        let line = |key: &CartKey, quantity: Option<u32>| CartLineRequest {
            expected_version,
            product_id: Some(key.product_id.clone()),
            variant_id: Some(key.variant_id.clone()),
            quantity,
            item: None,
        };

        let request = match mutation {
            CartMutation::Add { item, quantity } => {
                let key = item.key();
                let body = CartLineRequest {
                    item: Some(item),
                    ..line(&key, Some(quantity))
                };
                self.request(Method::POST, &["carts", id.as_str(), "lines"])?
                    .json(&body)
            }
            CartMutation::SetQuantity { key, quantity } => self
                .request(Method::PUT, &["carts", id.as_str(), "lines"])?
                .json(&line(&key, Some(quantity))),
            CartMutation::Remove { key } => self
                .request(Method::DELETE, &["carts", id.as_str(), "lines"])?
                .json(&line(&key, None)),
            CartMutation::Clear => self
                .request(Method::DELETE, &["carts", id.as_str()])?
                .json(&CartLineRequest {
                    expected_version,
                    product_id: None,
                    variant_id: None,
                    quantity: None,
                    item: None,
                }),
        };

        let envelope: CartEnvelope = self.execute(request).await?;
        Ok(envelope.into())
    }
}

// =============================================================================
// Catalog Methods
// =============================================================================

#[async_trait]
impl Catalog for HttpBackend {
    #[instrument(skip(self), fields(key = %key))]
    async fn available_stock(&self, key: &CartKey) -> Result<u32, BackendError> {
        let request = self.request(
            Method::GET,
            &[
                "catalog",
                "stock",
                key.product_id.as_str(),
                key.variant_id.as_str(),
            ],
        )?;
        let stock: StockResponse = self.execute(request).await?;
        Ok(stock.available)
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn variant(&self, key: &CartKey) -> Result<Option<CatalogVariant>, BackendError> {
        let request = self.request(
            Method::GET,
            &[
                "catalog",
                "variants",
                key.product_id.as_str(),
                key.variant_id.as_str(),
            ],
        )?;
        match self.execute::<CatalogVariant>(request).await {
            Ok(variant) => Ok(Some(variant)),
            Err(BackendError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self), fields(product_id = %id))]
    async fn taxonomy(&self, id: &ProductId) -> Result<Option<ProductTaxonomy>, BackendError> {
        let cache_key = format!("taxonomy:{id}");

        // Check cache
        if let Some(CacheValue::Taxonomy(taxonomy)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for taxonomy");
            return Ok(taxonomy.map(|t| *t));
        }

        let request = self.request(
            Method::GET,
            &["catalog", "products", id.as_str(), "taxonomy"],
        )?;
        let taxonomy = match self.execute::<ProductTaxonomy>(request).await {
            Ok(taxonomy) => Some(taxonomy),
            Err(BackendError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };

        // Cache the result
        self.inner
            .cache
            .insert(
                cache_key,
                CacheValue::Taxonomy(taxonomy.clone().map(Box::new)),
            )
            .await;

        Ok(taxonomy)
    }
}

// =============================================================================
// Voucher, Order and Eco-Impact Methods
// =============================================================================

#[async_trait]
impl VoucherRules for HttpBackend {
    #[instrument(
        skip(self, cart),
        fields(code = %code, cart_id = %cart.id, cart_version = cart.version)
    )]
    async fn validate(&self, code: &str, cart: &Cart) -> Result<VoucherOutcome, BackendError> {
        let request = self
            .request(Method::POST, &["vouchers", "validate"])?
            .json(&VoucherValidationRequest {
                code,
                cart_snapshot: cart,
            });
        self.execute(request).await
    }
}

#[async_trait]
impl OrderStore for HttpBackend {
    #[instrument(
        skip(self, submission),
        fields(idempotency_key = %submission.idempotency_key, code = %submission.code)
    )]
    async fn submit_order(
        &self,
        submission: &OrderSubmission,
    ) -> Result<OrderReceipt, BackendError> {
        let request = self
            .request(Method::POST, &["orders"])?
            .header(IDEMPOTENCY_KEY_HEADER, submission.idempotency_key.as_str())
            .json(submission);
        self.execute(request).await
    }
}

#[async_trait]
impl EcoImpactSource for HttpBackend {
    #[instrument(skip(self))]
    async fn lookup(&self, group_key: &str) -> Result<Option<EcoImpactProfile>, BackendError> {
        let cache_key = format!("eco:{}", group_key.trim().to_lowercase());

        if let Some(CacheValue::EcoImpact(profile)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for eco-impact group");
            return Ok(profile.map(|p| *p));
        }

        let request = self.request(Method::GET, &["eco-impact", group_key.trim()])?;
        let profile = match self.execute::<Option<EcoImpactProfile>>(request).await {
            Ok(profile) => profile,
            Err(BackendError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };

        self.inner
            .cache
            .insert(cache_key, CacheValue::EcoImpact(profile.clone().map(Box::new)))
            .await;

        Ok(profile)
    }
}
