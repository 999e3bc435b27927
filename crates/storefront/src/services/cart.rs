//! Cart operations against the authoritative cart service.
//!
//! A [`CartStore`] is opened per request for one cart. It holds the last
//! snapshot it saw and sends every write with that snapshot's version. When
//! another session has written in between, the store refetches and applies
//! the same intent once more before giving up.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use losia_core::{Cart, CartId, CartItem, CartKey, ProductId, VariantId};

use crate::backend::{BackendError, CONCURRENCY_CONFLICT, CartMutation, CartService, Catalog};
use crate::services::voucher::ValidationTracker;

/// Errors that can occur during cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// The cart changed under us twice in a row.
    #[error("cart changed concurrently (expected v{expected}, now v{current:?})")]
    ConcurrencyConflict { expected: u64, current: Option<u64> },

    /// Not enough stock for the requested quantity.
    #[error("only {available} of {product_id}/{variant_id} available, {requested} requested")]
    InsufficientStock {
        product_id: ProductId,
        variant_id: VariantId,
        requested: u32,
        available: u32,
    },

    /// The line is not in the cart.
    #[error("item {0} is not in the cart")]
    ItemNotFound(CartKey),

    /// The catalog has no such variant.
    #[error("variant {0} is not in the catalog")]
    VariantNotFound(CartKey),

    /// Quantity must be at least 1 when adding.
    #[error("quantity must be at least 1")]
    InvalidQuantity,

    /// The cart does not exist.
    #[error("cart not found: {0}")]
    CartNotFound(CartId),

    /// Cart service or catalog failure.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// What the caller wants done, replayable against a fresh snapshot.
#[derive(Debug, Clone)]
enum Intent {
    Add { item: CartItem, quantity: u32 },
    SetQuantity { key: CartKey, quantity: u32 },
    Remove { key: CartKey },
    Clear,
}

/// Owns one cart's state for the duration of an operation.
pub struct CartStore {
    carts: Arc<dyn CartService>,
    catalog: Arc<dyn Catalog>,
    tracker: Option<Arc<ValidationTracker>>,
    cart: Cart,
}

impl std::fmt::Debug for CartStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartStore")
            .field("cart_id", &self.cart.id)
            .field("version", &self.cart.version)
            .finish_non_exhaustive()
    }
}

impl CartStore {
    /// Fetch cart `id` and open a store over it.
    ///
    /// # Errors
    ///
    /// [`CartError::CartNotFound`] for an unknown cart, or a backend error.
    pub async fn open(
        carts: Arc<dyn CartService>,
        catalog: Arc<dyn Catalog>,
        id: &CartId,
    ) -> Result<Self, CartError> {
        let cart = fetch(carts.as_ref(), id).await?;
        Ok(Self::from_snapshot(carts, catalog, cart))
    }

    /// Open a store over a snapshot the caller already holds.
    #[must_use]
    pub fn from_snapshot(
        carts: Arc<dyn CartService>,
        catalog: Arc<dyn Catalog>,
        cart: Cart,
    ) -> Self {
        Self {
            carts,
            catalog,
            tracker: None,
            cart,
        }
    }

    /// Report every new cart version to `tracker`.
    #[must_use]
    pub fn with_tracker(mut self, tracker: Arc<ValidationTracker>) -> Self {
        tracker.observe_version(self.cart.version);
        self.tracker = Some(tracker);
        self
    }

    /// The last snapshot seen.
    #[must_use]
    pub const fn snapshot(&self) -> &Cart {
        &self.cart
    }

    #[must_use]
    pub fn into_snapshot(self) -> Cart {
        self.cart
    }

    /// Replace the snapshot with the authoritative cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart cannot be fetched.
    pub async fn refresh(&mut self) -> Result<&Cart, CartError> {
        let cart = fetch(self.carts.as_ref(), &self.cart.id).await?;
        self.replace(cart);
        Ok(&self.cart)
    }

    /// Add `quantity` of `item`, merging with an existing line.
    ///
    /// # Errors
    ///
    /// [`CartError::InvalidQuantity`] for zero,
    /// [`CartError::InsufficientStock`] when the line would exceed stock.
    pub async fn add_item(&mut self, item: CartItem, quantity: u32) -> Result<&Cart, CartError> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity);
        }
        self.apply(Intent::Add { item, quantity }).await
    }

    /// Add `quantity` of a catalog variant, priced from the catalog.
    ///
    /// # Errors
    ///
    /// [`CartError::VariantNotFound`] when the catalog does not know `key`,
    /// otherwise as [`CartStore::add_item`].
    pub async fn add_variant(&mut self, key: CartKey, quantity: u32) -> Result<&Cart, CartError> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity);
        }
        let variant = self
            .catalog
            .variant(&key)
            .await?
            .ok_or_else(|| CartError::VariantNotFound(key.clone()))?;
        self.add_item(variant.into_item(key, quantity), quantity).await
    }

    /// Set a line's quantity. Zero removes the line.
    ///
    /// # Errors
    ///
    /// [`CartError::ItemNotFound`] for a line not in the cart,
    /// [`CartError::InsufficientStock`] when raising past stock.
    pub async fn update_quantity(
        &mut self,
        key: &CartKey,
        quantity: u32,
    ) -> Result<&Cart, CartError> {
        if quantity == 0 {
            return self.remove_item(key).await;
        }
        self.apply(Intent::SetQuantity {
            key: key.clone(),
            quantity,
        })
        .await
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// [`CartError::ItemNotFound`] for a line not in the cart.
    pub async fn remove_item(&mut self, key: &CartKey) -> Result<&Cart, CartError> {
        self.apply(Intent::Remove { key: key.clone() }).await
    }

    /// Empty the cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart service refuses twice or is unreachable.
    pub async fn clear(&mut self) -> Result<&Cart, CartError> {
        self.apply(Intent::Clear).await
    }

    #[instrument(skip(self, intent), fields(cart_id = %self.cart.id))]
    async fn apply(&mut self, intent: Intent) -> Result<&Cart, CartError> {
        match self.try_apply(&intent).await {
            Err(CartError::ConcurrencyConflict { expected, current }) => {
                info!(expected, ?current, "Cart changed concurrently, refetching once");
                self.refresh().await?;
                self.try_apply(&intent).await?;
            }
            result => result?,
        }
        Ok(&self.cart)
    }

    async fn try_apply(&mut self, intent: &Intent) -> Result<(), CartError> {
        let expected = self.cart.version;

        let mutation = match intent {
            Intent::Add { item, quantity } => {
                let key = item.key();
                let requested = self.cart.quantity_of(&key).saturating_add(*quantity);
                self.ensure_stock(&key, requested).await?;
                CartMutation::Add {
                    item: item.clone(),
                    quantity: *quantity,
                }
            }
            Intent::SetQuantity { key, quantity } => {
                let current = self
                    .cart
                    .find(key)
                    .map(|line| line.quantity)
                    .ok_or_else(|| CartError::ItemNotFound(key.clone()))?;
                if *quantity > current {
                    self.ensure_stock(key, *quantity).await?;
                }
                CartMutation::SetQuantity {
                    key: key.clone(),
                    quantity: *quantity,
                }
            }
            Intent::Remove { key } => {
                if self.cart.find(key).is_none() {
                    return Err(CartError::ItemNotFound(key.clone()));
                }
                CartMutation::Remove { key: key.clone() }
            }
            Intent::Clear => CartMutation::Clear,
        };

        let cart = self
            .carts
            .mutate_cart(&self.cart.id, expected, mutation)
            .await
            .map_err(|e| match e {
                BackendError::Conflict {
                    ref reason,
                    current_version,
                } if reason == CONCURRENCY_CONFLICT => CartError::ConcurrencyConflict {
                    expected,
                    current: current_version,
                },
                BackendError::NotFound(_) => match intent {
                    Intent::SetQuantity { key, .. } | Intent::Remove { key } => {
                        CartError::ItemNotFound(key.clone())
                    }
                    Intent::Add { .. } | Intent::Clear => {
                        CartError::CartNotFound(self.cart.id.clone())
                    }
                },
                other => CartError::Backend(other),
            })?;

        debug!(from = expected, to = cart.version, "Cart updated");
        self.replace(cart);
        Ok(())
    }

    async fn ensure_stock(&self, key: &CartKey, requested: u32) -> Result<(), CartError> {
        let available = self.catalog.available_stock(key).await?;
        if requested > available {
            warn!(key = %key, requested, available, "Insufficient stock");
            return Err(CartError::InsufficientStock {
                product_id: key.product_id.clone(),
                variant_id: key.variant_id.clone(),
                requested,
                available,
            });
        }
        Ok(())
    }

    fn replace(&mut self, cart: Cart) {
        if let Some(tracker) = &self.tracker {
            tracker.observe_version(cart.version);
        }
        self.cart = cart;
    }
}

async fn fetch(carts: &dyn CartService, id: &CartId) -> Result<Cart, CartError> {
    carts.fetch_cart(id).await.map_err(|e| match e {
        BackendError::NotFound(_) => CartError::CartNotFound(id.clone()),
        other => CartError::Backend(other),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use losia_core::Money;

    use super::*;
    use crate::backend::memory::line;
    use crate::backend::{CatalogVariant, MemoryBackend};

    async fn setup() -> (Arc<MemoryBackend>, CartStore) {
        let backend = Arc::new(MemoryBackend::default());
        backend.set_stock(CartKey::new("p1", "v1"), 3).await;
        backend.set_stock(CartKey::new("p2", "v1"), 10).await;
        let cart = backend.create_cart().await.unwrap();
        let store = CartStore::from_snapshot(backend.clone(), backend.clone(), cart);
        (backend, store)
    }

    #[tokio::test]
    async fn test_add_merges_lines() {
        let (_, mut store) = setup().await;
        store.add_item(line("p1", "v1", 1, 100_000), 1).await.unwrap();
        let cart = store.add_item(line("p1", "v1", 1, 100_000), 2).await.unwrap();

        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.quantity_of(&CartKey::new("p1", "v1")), 3);
        assert_eq!(cart.version, 2);
        assert_eq!(cart.subtotal(), Money::from_units(300_000));
    }

    #[tokio::test]
    async fn test_variant_priced_from_catalog() {
        let (backend, mut store) = setup().await;
        backend
            .put_variant(
                CartKey::new("p1", "v1"),
                CatalogVariant {
                    unit_price: Money::from_units(180_000),
                    compare_at_price: Some(Money::from_units(200_000)),
                    size: Some("M".to_string()),
                    title: Some("Linen Shirt".to_string()),
                    image_url: None,
                },
            )
            .await;

        let cart = store.add_variant(CartKey::new("p1", "v1"), 2).await.unwrap();
        let item = &cart.items[0];
        assert_eq!(item.quantity, 2);
        assert_eq!(item.unit_price, Money::from_units(180_000));
        assert_eq!(item.title.as_deref(), Some("Linen Shirt"));
        assert_eq!(cart.subtotal(), Money::from_units(360_000));
    }

    #[tokio::test]
    async fn test_unknown_variant_not_added() {
        let (_, mut store) = setup().await;
        let err = store.add_variant(CartKey::new("p2", "v1"), 1).await.unwrap_err();
        assert!(matches!(err, CartError::VariantNotFound(_)));
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_add_beyond_stock_fails_without_clamping() {
        let (backend, mut store) = setup().await;
        store.add_item(line("p1", "v1", 1, 100_000), 2).await.unwrap();

        let err = store.add_item(line("p1", "v1", 1, 100_000), 2).await.unwrap_err();
        assert!(matches!(
            err,
            CartError::InsufficientStock { requested: 4, available: 3, .. }
        ));
        let stored = backend.cart(&store.snapshot().id).await.unwrap();
        assert_eq!(stored.quantity_of(&CartKey::new("p1", "v1")), 2);
    }

    #[tokio::test]
    async fn test_zero_quantity_add_rejected() {
        let (_, mut store) = setup().await;
        let err = store.add_item(line("p1", "v1", 1, 100_000), 0).await.unwrap_err();
        assert!(matches!(err, CartError::InvalidQuantity));
    }

    #[tokio::test]
    async fn test_update_to_zero_removes() {
        let (_, mut store) = setup().await;
        store.add_item(line("p1", "v1", 1, 100_000), 1).await.unwrap();
        let cart = store.update_quantity(&CartKey::new("p1", "v1"), 0).await.unwrap();
        assert!(cart.is_empty());
    }

    #[tokio::test]
    async fn test_missing_line() {
        let (_, mut store) = setup().await;
        let key = CartKey::new("ghost", "v1");
        assert!(matches!(
            store.update_quantity(&key, 2).await.unwrap_err(),
            CartError::ItemNotFound(_)
        ));
        assert!(matches!(
            store.remove_item(&key).await.unwrap_err(),
            CartError::ItemNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_decrease_skips_stock_check() {
        let (backend, mut store) = setup().await;
        store.add_item(line("p1", "v1", 1, 100_000), 3).await.unwrap();
        backend.set_stock(CartKey::new("p1", "v1"), 0).await;

        let cart = store.update_quantity(&CartKey::new("p1", "v1"), 1).await.unwrap();
        assert_eq!(cart.item_count(), 1);
    }

    #[tokio::test]
    async fn test_conflict_refetches_and_retries_once() {
        let (backend, mut store) = setup().await;
        store.add_item(line("p1", "v1", 1, 100_000), 1).await.unwrap();

        // another tab adds a different line
        let mut other = CartStore::open(backend.clone(), backend.clone(), &store.snapshot().id)
            .await
            .unwrap();
        other.add_item(line("p2", "v1", 1, 50_000), 1).await.unwrap();

        let cart = store.add_item(line("p1", "v1", 1, 100_000), 1).await.unwrap();
        assert_eq!(cart.version, 3);
        assert_eq!(cart.quantity_of(&CartKey::new("p1", "v1")), 2);
        assert_eq!(cart.quantity_of(&CartKey::new("p2", "v1")), 1);
    }

    #[tokio::test]
    async fn test_retry_rechecks_stock_against_fresh_cart() {
        let (backend, mut store) = setup().await;
        store.add_item(line("p1", "v1", 1, 100_000), 1).await.unwrap();

        let mut other = CartStore::open(backend.clone(), backend.clone(), &store.snapshot().id)
            .await
            .unwrap();
        other.add_item(line("p1", "v1", 1, 100_000), 2).await.unwrap();

        // stale view says 1 + 1 = 2; fresh cart says 3 + 1 = 4 > 3
        let err = store.add_item(line("p1", "v1", 1, 100_000), 1).await.unwrap_err();
        assert!(matches!(err, CartError::InsufficientStock { requested: 4, .. }));
    }

    /// Cart service that always reports a conflict.
    struct AlwaysConflicting {
        inner: Arc<MemoryBackend>,
        writes: AtomicUsize,
    }

    #[async_trait]
    impl CartService for AlwaysConflicting {
        async fn create_cart(&self) -> Result<Cart, BackendError> {
            self.inner.create_cart().await
        }

        async fn fetch_cart(&self, id: &CartId) -> Result<Cart, BackendError> {
            self.inner.fetch_cart(id).await
        }

        async fn mutate_cart(
            &self,
            _id: &CartId,
            _expected_version: u64,
            _mutation: CartMutation,
        ) -> Result<Cart, BackendError> {
            let n = self.writes.fetch_add(1, Ordering::SeqCst);
            Err(BackendError::Conflict {
                reason: CONCURRENCY_CONFLICT.to_string(),
                current_version: Some(u64::try_from(n).unwrap_or(0) + 10),
            })
        }
    }

    #[tokio::test]
    async fn test_second_conflict_surfaces() {
        let backend = Arc::new(MemoryBackend::default());
        backend.set_stock(CartKey::new("p1", "v1"), 5).await;
        let cart = backend.create_cart().await.unwrap();
        let carts = Arc::new(AlwaysConflicting {
            inner: backend.clone(),
            writes: AtomicUsize::new(0),
        });

        let mut store = CartStore::from_snapshot(carts.clone(), backend, cart);
        let err = store.add_item(line("p1", "v1", 1, 100_000), 1).await.unwrap_err();
        assert!(matches!(err, CartError::ConcurrencyConflict { .. }));
        assert_eq!(carts.writes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_mutations_advance_tracker() {
        let (_, store) = setup().await;
        let tracker = Arc::new(ValidationTracker::new(0));
        let mut store = store.with_tracker(tracker.clone());
        let ticket = tracker.issue(0);

        store.add_item(line("p1", "v1", 1, 100_000), 1).await.unwrap();
        assert_eq!(tracker.cart_version(), 1);
        assert!(!tracker.is_current(&ticket));
    }

    #[tokio::test]
    async fn test_open_unknown_cart() {
        let backend = Arc::new(MemoryBackend::default());
        let err = CartStore::open(backend.clone(), backend, &CartId::new("nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, CartError::CartNotFound(_)));
    }
}
