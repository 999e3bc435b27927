//! In-process backend.
//!
//! Runs the whole flow without a commerce backend: `LOSIA_BACKEND=memory`
//! for local development, and the collaborator double for tests. Behaves
//! like the real one where it matters (versioned carts, 409 conflicts,
//! orders deduplicated by idempotency key, unique order codes) and can be
//! told to fail the next order submissions in specific ways.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use uuid::Uuid;

use losia_core::{
    Cart, CartId, CartKey, Clock, EcoImpactProfile, EcoImpactTable, IdempotencyKey,
    Money, OrderId, ProductId, ProductTaxonomy, ProductType, SystemClock, Voucher, VoucherKind,
    VoucherOutcome, VoucherRejection,
};

use super::types::{CatalogVariant, OrderReceipt, OrderSubmission};
use super::{
    BackendError, CONCURRENCY_CONFLICT, CartMutation, CartService, Catalog, DUPLICATE_ORDER_CODE,
    EcoImpactSource, OrderStore, VoucherRules,
};

/// A scripted failure for the next order submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderFault {
    /// Refuse with a 503 before persisting anything.
    Unavailable,
    /// Persist the order, then lose the response.
    LostResponse,
    /// Refuse the proposed code as already taken.
    DuplicateCode,
    /// Refuse on business grounds.
    Reject { status: u16, reason: String },
    /// Persist, but report a different total than submitted.
    ReportTotal(Money),
}

/// An order accepted by the memory store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredOrder {
    pub order_id: OrderId,
    pub code: String,
    pub submission: OrderSubmission,
}

#[derive(Debug, Default)]
struct MemoryState {
    carts: HashMap<CartId, Cart>,
    stock: HashMap<CartKey, u32>,
    variants: HashMap<CartKey, CatalogVariant>,
    taxonomy: HashMap<ProductId, ProductTaxonomy>,
    vouchers: HashMap<String, Voucher>,
    orders: HashMap<IdempotencyKey, StoredOrder>,
    order_log: Vec<IdempotencyKey>,
    codes: HashSet<String>,
    order_faults: VecDeque<OrderFault>,
}

/// Backend that keeps everything in process memory.
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    eco_impact: EcoImpactTable,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend").finish_non_exhaustive()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl MemoryBackend {
    /// An empty backend with the built-in eco-impact table.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            eco_impact: EcoImpactTable::builtin(),
            clock,
        }
    }

    /// A backend with a small demo catalog and voucher set.
    #[must_use]
    pub fn seeded() -> Self {
        let backend = Self::default();
        let now = backend.clock.now();
        let mut state = MemoryState::default();

        let products = [
            ("prd-linen-dress", "v-m", "Midi Dress", Some("Dress"), None, 3),
            ("prd-denim-jacket", "v-l", "Trucker Jacket", Some("Outerwear"), None, 1),
            ("prd-silk-top", "v-s", "Camisole", None, Some("Top"), 5),
            ("prd-canvas-tote", "v-os", "Tote", Some("Bag"), Some("Bag"), 8),
        ];
        for (product, variant, type_name, parent, label, available) in products {
            state.stock.insert(CartKey::new(product, variant), available);
            state.taxonomy.insert(
                ProductId::new(product),
                ProductTaxonomy {
                    product_id: ProductId::new(product),
                    product_type: Some(ProductType {
                        name: type_name.to_string(),
                        parent_name: parent.map(String::from),
                    }),
                    eco_impact_group: label.map(String::from),
                },
            );
        }

        let prices = [
            ("prd-linen-dress", "v-m", "Linen Midi Dress", "M", 250_000, Some(320_000)),
            ("prd-denim-jacket", "v-l", "Denim Trucker Jacket", "L", 650_000, None),
            ("prd-silk-top", "v-s", "Silk Camisole", "S", 120_000, Some(150_000)),
            ("prd-canvas-tote", "v-os", "Canvas Tote", "One size", 90_000, None),
        ];
        for (product, variant, title, size, unit, compare_at) in prices {
            state.variants.insert(
                CartKey::new(product, variant),
                CatalogVariant {
                    unit_price: Money::from_units(unit),
                    compare_at_price: compare_at.map(Money::from_units),
                    size: Some(size.to_string()),
                    title: Some(title.to_string()),
                    image_url: None,
                },
            );
        }

        let vouchers = [
            voucher("SALE10", VoucherKind::Percent { rate: Decimal::new(1, 1) }),
            voucher("FREESHIP", VoucherKind::FreeShipping),
            Voucher {
                min_subtotal: Some(Money::from_units(200_000)),
                ..voucher("GIAM50K", VoucherKind::Fixed { amount: Money::from_units(50_000) })
            },
            Voucher {
                expires_at: Some(now - Duration::days(1)),
                ..voucher("EXPIRED10", VoucherKind::Percent { rate: Decimal::new(1, 1) })
            },
        ];
        for v in vouchers {
            state.vouchers.insert(v.code.clone(), v);
        }

        Self {
            state: Mutex::new(state),
            ..backend
        }
    }

    // =========================================================================
    // Setup and inspection
    // =========================================================================

    /// Store `cart` as-is, replacing any cart with the same id.
    pub async fn put_cart(&self, cart: Cart) {
        self.state.lock().await.carts.insert(cart.id.clone(), cart);
    }

    pub async fn set_stock(&self, key: CartKey, available: u32) {
        self.state.lock().await.stock.insert(key, available);
    }

    pub async fn put_variant(&self, key: CartKey, variant: CatalogVariant) {
        self.state.lock().await.variants.insert(key, variant);
    }

    pub async fn put_taxonomy(&self, taxonomy: ProductTaxonomy) {
        self.state
            .lock()
            .await
            .taxonomy
            .insert(taxonomy.product_id.clone(), taxonomy);
    }

    pub async fn put_voucher(&self, voucher: Voucher) {
        self.state
            .lock()
            .await
            .vouchers
            .insert(Voucher::normalize_code(&voucher.code), voucher);
    }

    /// Mark `code` as taken so the next submission proposing it collides.
    pub async fn reserve_code(&self, code: impl Into<String>) {
        self.state.lock().await.codes.insert(code.into());
    }

    /// Queue a failure for the next order submission.
    pub async fn push_order_fault(&self, fault: OrderFault) {
        self.state.lock().await.order_faults.push_back(fault);
    }

    /// Orders in the order they were persisted.
    pub async fn orders(&self) -> Vec<StoredOrder> {
        let state = self.state.lock().await;
        state
            .order_log
            .iter()
            .filter_map(|key| state.orders.get(key).cloned())
            .collect()
    }

    pub async fn cart(&self, id: &CartId) -> Option<Cart> {
        self.state.lock().await.carts.get(id).cloned()
    }
}

fn voucher(code: &str, kind: VoucherKind) -> Voucher {
    Voucher {
        code: code.to_string(),
        kind,
        min_subtotal: None,
        expires_at: None,
        usage_limit: None,
        usage_count: None,
    }
}

fn line_not_found(key: &CartKey) -> BackendError {
    BackendError::NotFound(format!("cart line {key}"))
}

// =============================================================================
// Collaborator implementations
// =============================================================================

#[async_trait]
impl CartService for MemoryBackend {
    async fn create_cart(&self) -> Result<Cart, BackendError> {
        let cart = Cart::empty(format!("cart-{}", Uuid::new_v4().simple()));
        self.put_cart(cart.clone()).await;
        Ok(cart)
    }

    async fn fetch_cart(&self, id: &CartId) -> Result<Cart, BackendError> {
        self.cart(id)
            .await
            .ok_or_else(|| BackendError::NotFound(format!("cart {id}")))
    }

    async fn mutate_cart(
        &self,
        id: &CartId,
        expected_version: u64,
        mutation: CartMutation,
    ) -> Result<Cart, BackendError> {
        let mut state = self.state.lock().await;
        let cart = state
            .carts
            .get_mut(id)
            .ok_or_else(|| BackendError::NotFound(format!("cart {id}")))?;

        if cart.version != expected_version {
            return Err(BackendError::Conflict {
                reason: CONCURRENCY_CONFLICT.to_string(),
                current_version: Some(cart.version),
            });
        }

        match mutation {
            CartMutation::Add { item, quantity } => cart.add(item, quantity),
            CartMutation::SetQuantity { key, quantity } => {
                if !cart.set_quantity(&key, quantity) {
                    return Err(line_not_found(&key));
                }
            }
            CartMutation::Remove { key } => {
                if !cart.remove(&key) {
                    return Err(line_not_found(&key));
                }
            }
            CartMutation::Clear => cart.items.clear(),
        }
        cart.version += 1;

        Ok(cart.clone())
    }
}

#[async_trait]
impl Catalog for MemoryBackend {
    async fn available_stock(&self, key: &CartKey) -> Result<u32, BackendError> {
        Ok(self.state.lock().await.stock.get(key).copied().unwrap_or(0))
    }

    async fn variant(&self, key: &CartKey) -> Result<Option<CatalogVariant>, BackendError> {
        Ok(self.state.lock().await.variants.get(key).cloned())
    }

    async fn taxonomy(&self, id: &ProductId) -> Result<Option<ProductTaxonomy>, BackendError> {
        Ok(self.state.lock().await.taxonomy.get(id).cloned())
    }
}

#[async_trait]
impl VoucherRules for MemoryBackend {
    async fn validate(&self, code: &str, cart: &Cart) -> Result<VoucherOutcome, BackendError> {
        let state = self.state.lock().await;
        let Some(voucher) = state.vouchers.get(&Voucher::normalize_code(code)) else {
            return Ok(VoucherOutcome::Rejected(VoucherRejection::NotFound));
        };
        Ok(match voucher.check(cart.subtotal(), self.clock.now()) {
            Ok(()) => VoucherOutcome::Valid(voucher.clone()),
            Err(reason) => VoucherOutcome::Rejected(reason),
        })
    }
}

#[async_trait]
impl OrderStore for MemoryBackend {
    async fn submit_order(
        &self,
        submission: &OrderSubmission,
    ) -> Result<OrderReceipt, BackendError> {
        let mut state = self.state.lock().await;
        let fault = state.order_faults.pop_front();

        match &fault {
            Some(OrderFault::Unavailable) => {
                return Err(BackendError::Unavailable("HTTP 503: order store".to_string()));
            }
            Some(OrderFault::DuplicateCode) => {
                return Err(BackendError::Conflict {
                    reason: DUPLICATE_ORDER_CODE.to_string(),
                    current_version: None,
                });
            }
            Some(OrderFault::Reject { status, reason }) => {
                return Err(BackendError::Rejected {
                    status: *status,
                    reason: reason.clone(),
                    details: None,
                });
            }
            Some(OrderFault::LostResponse | OrderFault::ReportTotal(_)) | None => {}
        }

        if let Some(existing) = state.orders.get(&submission.idempotency_key) {
            return Ok(OrderReceipt {
                order_id: existing.order_id.clone(),
                code: Some(existing.code.clone()),
                total: Some(existing.submission.totals.total),
            });
        }

        if state.codes.contains(&submission.code) {
            return Err(BackendError::Conflict {
                reason: DUPLICATE_ORDER_CODE.to_string(),
                current_version: None,
            });
        }

        let order_id = OrderId::new(format!("ord-{:06}", state.order_log.len() + 1));
        let stored = StoredOrder {
            order_id: order_id.clone(),
            code: submission.code.clone(),
            submission: submission.clone(),
        };
        state.codes.insert(submission.code.clone());
        state.order_log.push(submission.idempotency_key.clone());
        state
            .orders
            .insert(submission.idempotency_key.clone(), stored);

        match fault {
            Some(OrderFault::LostResponse) => Err(BackendError::Unavailable(
                "connection reset before response".to_string(),
            )),
            Some(OrderFault::ReportTotal(total)) => Ok(OrderReceipt {
                order_id,
                code: Some(submission.code.clone()),
                total: Some(total),
            }),
            _ => Ok(OrderReceipt {
                order_id,
                code: Some(submission.code.clone()),
                total: Some(submission.totals.total),
            }),
        }
    }
}

#[async_trait]
impl EcoImpactSource for MemoryBackend {
    async fn lookup(&self, group_key: &str) -> Result<Option<EcoImpactProfile>, BackendError> {
        Ok(self.eco_impact.lookup(group_key).cloned())
    }
}

/// A cart line with no compare-at price.
#[cfg(test)]
pub(crate) fn line(
    product: &str,
    variant: &str,
    quantity: u32,
    unit_price: i64,
) -> losia_core::CartItem {
    losia_core::CartItem {
        product_id: ProductId::new(product),
        variant_id: losia_core::VariantId::new(variant),
        quantity,
        unit_price: Money::from_units(unit_price),
        compare_at_price: None,
        size: None,
        title: None,
        image_url: None,
    }
}
