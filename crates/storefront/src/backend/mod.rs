//! Collaborators behind the order-fulfillment flow.
//!
//! # Architecture
//!
//! - The cart service, catalog, voucher rules, order store and eco-impact
//!   data live in the commerce backend; the storefront is a client of each
//! - Every collaborator is a trait so services can be driven by the HTTP
//!   backend in production and by [`memory::MemoryBackend`] in tests and
//!   local development
//! - Read-only lookups (taxonomy, eco-impact groups) are cached via `moka`
//!   in the HTTP backend (5 minute TTL)
//!
//! # Example
//!
//! ```rust,ignore
//! use losia_storefront::backend::{HttpBackend, StorefrontBackend};
//!
//! let http = HttpBackend::new(&config.backend)?;
//! let backend = StorefrontBackend::from_shared(Arc::new(http));
//!
//! let cart = backend.carts.fetch_cart(&cart_id).await?;
//! ```

pub mod http;
pub mod memory;
pub mod types;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use losia_core::{Cart, CartId, CartItem, CartKey, EcoImpactProfile, EcoImpactTable, ProductId};
use losia_core::{ProductTaxonomy, VoucherOutcome};

pub use http::HttpBackend;
pub use memory::MemoryBackend;
pub use types::{CatalogVariant, OrderReceipt, OrderSubmission};

/// Conflict reason for a stale `expectedVersion`.
pub const CONCURRENCY_CONFLICT: &str = "ConcurrencyConflict";

/// Conflict reason for an order code that is already taken.
pub const DUPLICATE_ORDER_CODE: &str = "DuplicateOrderCode";

// =============================================================================
// Errors
// =============================================================================

/// Errors that can occur when talking to the commerce backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered 5xx or could not be reached.
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Rate limited by the backend.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Write refused because of a conflicting state (HTTP 409).
    #[error("Conflict: {reason}")]
    Conflict {
        reason: String,
        current_version: Option<u64>,
    },

    /// Request refused on business grounds (HTTP 4xx).
    #[error("Rejected ({status}): {reason}")]
    Rejected {
        status: u16,
        reason: String,
        details: Option<serde_json::Value>,
    },

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl BackendError {
    /// Whether repeating the same request may succeed.
    ///
    /// Timeouts, connection failures, 5xx and 429 are retryable. Business
    /// rejections and conflicts are not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(err) => {
                err.is_timeout()
                    || err.is_connect()
                    || err.is_request()
                    || err.status().is_some_and(|s| s.is_server_error())
            }
            Self::Unavailable(_) | Self::RateLimited(_) => true,
            Self::Conflict { .. } | Self::Rejected { .. } | Self::NotFound(_) | Self::Parse(_) => {
                false
            }
        }
    }

    /// Whether this is a 409 with the given reason.
    #[must_use]
    pub fn is_conflict(&self, expected: &str) -> bool {
        matches!(self, Self::Conflict { reason, .. } if reason == expected)
    }
}

// =============================================================================
// Collaborator traits
// =============================================================================

/// A single cart write, guarded by the version the caller last saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartMutation {
    /// Add `quantity` of `item`, merging with an existing line.
    Add { item: CartItem, quantity: u32 },
    /// Set a line's quantity; `0` removes it.
    SetQuantity { key: CartKey, quantity: u32 },
    Remove { key: CartKey },
    Clear,
}

/// Authoritative cart storage with optimistic concurrency.
#[async_trait]
pub trait CartService: Send + Sync {
    async fn create_cart(&self) -> Result<Cart, BackendError>;

    async fn fetch_cart(&self, id: &CartId) -> Result<Cart, BackendError>;

    /// Apply `mutation` if the cart is still at `expected_version`.
    ///
    /// Returns the cart at its new version, or a
    /// [`CONCURRENCY_CONFLICT`] conflict carrying the current version.
    async fn mutate_cart(
        &self,
        id: &CartId,
        expected_version: u64,
        mutation: CartMutation,
    ) -> Result<Cart, BackendError>;
}

/// Read access to the catalog.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Units of a variant currently available for sale.
    async fn available_stock(&self, key: &CartKey) -> Result<u32, BackendError>;

    /// Current price and display data of a variant, or `None` when unknown.
    async fn variant(&self, key: &CartKey) -> Result<Option<CatalogVariant>, BackendError>;

    /// Taxonomy of a product, or `None` when the product is unknown.
    async fn taxonomy(&self, id: &ProductId) -> Result<Option<ProductTaxonomy>, BackendError>;
}

/// Authoritative voucher rules.
#[async_trait]
pub trait VoucherRules: Send + Sync {
    /// Judge `code` against `cart` exactly as given.
    async fn validate(&self, code: &str, cart: &Cart) -> Result<VoucherOutcome, BackendError>;
}

/// Order persistence.
///
/// Implementations must deduplicate on the submission's idempotency key:
/// a repeated key returns the order created by the first request.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn submit_order(
        &self,
        submission: &OrderSubmission,
    ) -> Result<OrderReceipt, BackendError>;
}

/// Source of eco-impact profiles by group key.
#[async_trait]
pub trait EcoImpactSource: Send + Sync {
    async fn lookup(&self, group_key: &str) -> Result<Option<EcoImpactProfile>, BackendError>;
}

#[async_trait]
impl EcoImpactSource for EcoImpactTable {
    async fn lookup(&self, group_key: &str) -> Result<Option<EcoImpactProfile>, BackendError> {
        Ok(Self::lookup(self, group_key).cloned())
    }
}

// =============================================================================
// Backend bundle
// =============================================================================

/// All collaborators the storefront talks to.
#[derive(Clone)]
pub struct StorefrontBackend {
    pub carts: Arc<dyn CartService>,
    pub catalog: Arc<dyn Catalog>,
    pub vouchers: Arc<dyn VoucherRules>,
    pub orders: Arc<dyn OrderStore>,
    pub eco_impact: Arc<dyn EcoImpactSource>,
}

impl StorefrontBackend {
    /// Use one implementation for every collaborator.
    pub fn from_shared<B>(backend: Arc<B>) -> Self
    where
        B: CartService + Catalog + VoucherRules + OrderStore + EcoImpactSource + 'static,
    {
        Self {
            carts: backend.clone(),
            catalog: backend.clone(),
            vouchers: backend.clone(),
            orders: backend.clone(),
            eco_impact: backend,
        }
    }

    /// Replace the eco-impact source, e.g. with a local table.
    #[must_use]
    pub fn with_eco_impact(mut self, source: Arc<dyn EcoImpactSource>) -> Self {
        self.eco_impact = source;
        self
    }
}

impl std::fmt::Debug for StorefrontBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorefrontBackend").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(BackendError::Unavailable("503".to_owned()).is_retryable());
        assert!(BackendError::RateLimited(2).is_retryable());
        assert!(
            !BackendError::Rejected {
                status: 422,
                reason: "InvalidAddress".to_owned(),
                details: None,
            }
            .is_retryable()
        );
        assert!(
            !BackendError::Conflict {
                reason: DUPLICATE_ORDER_CODE.to_owned(),
                current_version: None,
            }
            .is_retryable()
        );
        assert!(!BackendError::NotFound("cart".to_owned()).is_retryable());
    }

    #[test]
    fn test_conflict_reason_match() {
        let err = BackendError::Conflict {
            reason: CONCURRENCY_CONFLICT.to_owned(),
            current_version: Some(4),
        };
        assert!(err.is_conflict(CONCURRENCY_CONFLICT));
        assert!(!err.is_conflict(DUPLICATE_ORDER_CODE));
    }

    #[tokio::test]
    async fn test_table_as_eco_source() {
        let table = EcoImpactTable::builtin();
        let source: &dyn EcoImpactSource = &table;
        assert_eq!(
            source.lookup("dress").await.ok().flatten().map(|p| p.group),
            Some("Dress".to_owned())
        );
        assert!(source.lookup("Sofa").await.ok().flatten().is_none());
    }
}
