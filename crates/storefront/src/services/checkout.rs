//! Checkout orchestration.
//!
//! One [`CheckoutOrchestrator::submit`] call is one attempt:
//!
//! ```text
//! Draft -> Submitting -> Created
//!                     -> RejectedByBackend
//!                     -> TransportFailed  (client retries with the same key)
//! ```
//!
//! Everything before `Submitting` (voucher, stock, price) is re-checked
//! against the exact cart snapshot being submitted. The idempotency key rides
//! along to the order store so a retried submission can never become a
//! second order.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use moka::future::Cache;
use rand::Rng;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use losia_core::{
    Cart, CheckoutState, CustomerContact, IdempotencyKey, Money, Order, OrderCodeGenerator,
    OrderDraft, OrderId, OrderStatus, PaymentMethod, PricingPolicy, ProductId, ShippingAddress,
    VariantId, VoucherOutcome, VoucherRejection, price,
};

use crate::backend::{
    BackendError, CartService, Catalog, DUPLICATE_ORDER_CODE, OrderStore, OrderSubmission,
    StorefrontBackend,
};
use crate::services::cart::CartStore;
use crate::services::notification::{NotificationDispatcher, OrderNotification};
use crate::services::voucher::{VoucherError, VoucherValidator};

/// How long completed attempts are remembered for duplicate submissions.
const COMPLETED_TTL: Duration = Duration::from_secs(60 * 60);

/// Errors that end a checkout attempt without an order.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("cart is empty")]
    EmptyCart,

    #[error("invalid checkout input: {0}")]
    InvalidInput(String),

    /// Another submission with the same idempotency key is still running.
    #[error("a submission for this attempt is already in progress")]
    SubmissionInProgress,

    /// The voucher was checked against an older cart.
    #[error("voucher was validated at cart v{validated_at}, cart is now v{current}")]
    StaleVoucher { validated_at: u64, current: u64 },

    #[error("voucher rejected: {0}")]
    Validation(VoucherRejection),

    #[error("only {available} of {product_id}/{variant_id} available, {requested} requested")]
    InventoryConflict {
        product_id: ProductId,
        variant_id: VariantId,
        requested: u32,
        available: u32,
    },

    /// The total differs from what the shopper saw, or from what the order
    /// store recorded. `order_id` is set in the second case.
    #[error("price mismatch: expected {expected}, got {actual}")]
    PriceMismatch {
        expected: Money,
        actual: Money,
        order_id: Option<OrderId>,
    },

    #[error("order rejected: {reason}")]
    RejectedByBackend {
        reason: String,
        details: Option<Value>,
    },

    /// Safe to retry with the same idempotency key.
    #[error("order store unreachable: {0}")]
    TransportFailed(#[source] BackendError),
}

impl CheckoutError {
    /// Whether the client may re-trigger the attempt unchanged.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TransportFailed(_) | Self::SubmissionInProgress)
    }
}

/// A voucher the shopper applied, with the cart version it was checked at.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoucherClaim {
    pub code: String,
    pub validated_at_version: u64,
}

/// Everything needed to place an order for one cart snapshot.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub cart: Cart,
    pub voucher: Option<VoucherClaim>,
    pub customer: CustomerContact,
    pub address: ShippingAddress,
    pub payment_method: PaymentMethod,
    /// Absent on a first attempt; a fresh key is generated.
    pub idempotency_key: Option<IdempotencyKey>,
    /// The total the shopper last saw.
    pub expected_total: Option<Money>,
}

/// Delay before the single retry of a transient submission failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base: Duration,
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(200),
            jitter: Duration::from_millis(300),
        }
    }
}

impl RetryPolicy {
    /// A random delay in `[base, base + jitter]`.
    #[must_use]
    pub fn delay(&self) -> Duration {
        let jitter_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        if jitter_ms == 0 {
            return self.base;
        }
        self.base + Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
    }
}

/// Tunables for the orchestrator.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub pricing: PricingPolicy,
    pub retry: RetryPolicy,
    pub code_prefix: String,
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            pricing: PricingPolicy::default(),
            retry: RetryPolicy::default(),
            code_prefix: losia_core::order_code::DEFAULT_PREFIX.to_string(),
        }
    }
}

// =============================================================================
// Attempt bookkeeping
// =============================================================================

/// Marks an idempotency key as in flight until dropped.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<IdempotencyKey>>,
    key: IdempotencyKey,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(
        set: &'a Mutex<HashSet<IdempotencyKey>>,
        key: &IdempotencyKey,
    ) -> Result<Self, CheckoutError> {
        let mut keys = set.lock().unwrap_or_else(PoisonError::into_inner);
        if !keys.insert(key.clone()) {
            return Err(CheckoutError::SubmissionInProgress);
        }
        Ok(Self {
            set,
            key: key.clone(),
        })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

/// Outcome of claiming an idempotency key.
enum Claim<'a> {
    Run(InFlightGuard<'a>),
    Completed(Order),
}

/// Tracks and logs the state of one attempt.
struct Attempt {
    key: IdempotencyKey,
    state: CheckoutState,
}

impl Attempt {
    fn new(key: IdempotencyKey) -> Self {
        info!(idempotency_key = %key, state = %CheckoutState::Draft, "Checkout started");
        Self {
            key,
            state: CheckoutState::Draft,
        }
    }

    fn transition(&mut self, next: CheckoutState) {
        if !self.state.can_transition_to(next) {
            warn!(
                idempotency_key = %self.key,
                from = %self.state,
                to = %next,
                "Unexpected checkout transition"
            );
        }
        info!(
            idempotency_key = %self.key,
            from = %self.state,
            to = %next,
            "Checkout state changed"
        );
        self.state = next;
    }
}

// =============================================================================
// CheckoutOrchestrator
// =============================================================================

/// Places orders. Cheap to clone.
#[derive(Clone)]
pub struct CheckoutOrchestrator {
    inner: Arc<CheckoutOrchestratorInner>,
}

struct CheckoutOrchestratorInner {
    carts: Arc<dyn CartService>,
    catalog: Arc<dyn Catalog>,
    orders: Arc<dyn OrderStore>,
    validator: VoucherValidator,
    dispatcher: NotificationDispatcher,
    codes: OrderCodeGenerator,
    settings: CheckoutSettings,
    in_flight: Mutex<HashSet<IdempotencyKey>>,
    completed: Cache<IdempotencyKey, Order>,
}

impl std::fmt::Debug for CheckoutOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutOrchestrator")
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}

impl CheckoutOrchestrator {
    #[must_use]
    pub fn new(
        backend: &StorefrontBackend,
        validator: VoucherValidator,
        dispatcher: NotificationDispatcher,
        codes: OrderCodeGenerator,
        settings: CheckoutSettings,
    ) -> Self {
        let completed = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(COMPLETED_TTL)
            .build();

        Self {
            inner: Arc::new(CheckoutOrchestratorInner {
                carts: Arc::clone(&backend.carts),
                catalog: Arc::clone(&backend.catalog),
                orders: Arc::clone(&backend.orders),
                validator,
                dispatcher,
                codes,
                settings,
                in_flight: Mutex::new(HashSet::new()),
                completed,
            }),
        }
    }

    #[must_use]
    pub fn pricing(&self) -> &PricingPolicy {
        &self.inner.settings.pricing
    }

    /// The order an earlier attempt with `key` produced, if remembered.
    pub async fn completed_order(&self, key: &IdempotencyKey) -> Option<Order> {
        self.inner.completed.get(key).await
    }

    /// Run one checkout attempt.
    ///
    /// Re-submitting a key whose attempt already succeeded returns the same
    /// order.
    ///
    /// # Errors
    ///
    /// See [`CheckoutError`]; only [`CheckoutError::TransportFailed`] and
    /// [`CheckoutError::SubmissionInProgress`] are worth retrying as-is.
    #[instrument(skip_all, fields(cart_id = %request.cart.id, cart_version = request.cart.version))]
    pub async fn submit(&self, request: CheckoutRequest) -> Result<Order, CheckoutError> {
        let key = request
            .idempotency_key
            .clone()
            .unwrap_or_else(IdempotencyKey::generate);

        if let Some(order) = self.inner.completed.get(&key).await {
            info!(idempotency_key = %key, order_code = %order.code, "Attempt already completed");
            return Ok(order);
        }

        let _guard = match self.claim(&key).await? {
            Claim::Run(guard) => guard,
            Claim::Completed(order) => {
                info!(
                    idempotency_key = %key,
                    order_code = %order.code,
                    "Attempt completed meanwhile"
                );
                return Ok(order);
            }
        };
        let mut attempt = Attempt::new(key.clone());

        let draft = self.prepare(&request, key.clone()).await?;

        attempt.transition(CheckoutState::Submitting);
        let (order_id, code) = match self.place(&draft).await {
            Ok(placed) => placed,
            Err(e) => {
                attempt.transition(if e.is_retryable() {
                    CheckoutState::TransportFailed
                } else {
                    CheckoutState::RejectedByBackend
                });
                return Err(e);
            }
        };
        attempt.transition(CheckoutState::Created);

        self.clear_cart(&request.cart).await;

        let mut order = Order {
            id: order_id,
            code,
            draft,
            status: OrderStatus::Created,
        };
        if let Err(e) = self.inner.dispatcher.dispatch(OrderNotification::from(&order)) {
            warn!(order_code = %order.code, error = %e, "Notification hand-off refused");
            order.status = OrderStatus::NotificationFailed;
        }

        info!(
            idempotency_key = %key,
            order_id = %order.id,
            order_code = %order.code,
            total = %order.draft.totals().total,
            status = %order.status,
            "Order placed"
        );
        self.inner.completed.insert(key, order.clone()).await;
        Ok(order)
    }

    /// Mark `key` in flight, unless an attempt with it finished since the
    /// caller last looked.
    ///
    /// The memo is written before the guard is released, so checking it
    /// while holding the guard cannot miss a completed attempt.
    async fn claim(&self, key: &IdempotencyKey) -> Result<Claim<'_>, CheckoutError> {
        let guard = InFlightGuard::acquire(&self.inner.in_flight, key)?;
        match self.inner.completed.get(key).await {
            Some(order) => Ok(Claim::Completed(order)),
            None => Ok(Claim::Run(guard)),
        }
    }

    /// Input guards, voucher, stock and price against the snapshot.
    async fn prepare(
        &self,
        request: &CheckoutRequest,
        key: IdempotencyKey,
    ) -> Result<OrderDraft, CheckoutError> {
        let cart = &request.cart;
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        request
            .customer
            .validate()
            .map_err(|e| CheckoutError::InvalidInput(e.to_string()))?;
        request
            .address
            .validate()
            .map_err(|e| CheckoutError::InvalidInput(e.to_string()))?;

        let voucher = match &request.voucher {
            None => None,
            Some(claim) if claim.validated_at_version != cart.version => {
                return Err(CheckoutError::StaleVoucher {
                    validated_at: claim.validated_at_version,
                    current: cart.version,
                });
            }
            Some(claim) => match self.inner.validator.validate(&claim.code, cart).await {
                Ok(VoucherOutcome::Valid(voucher)) => Some(voucher),
                Ok(VoucherOutcome::Rejected(reason)) => {
                    return Err(CheckoutError::Validation(reason));
                }
                Err(VoucherError::TransportFailed(e)) => {
                    return Err(CheckoutError::TransportFailed(e));
                }
                Err(e) => {
                    return Err(CheckoutError::TransportFailed(BackendError::Unavailable(
                        e.to_string(),
                    )));
                }
            },
        };

        for item in &cart.items {
            let available = match self.inner.catalog.available_stock(&item.key()).await {
                Ok(available) => available,
                Err(BackendError::NotFound(_)) => 0,
                Err(e) => return Err(backend_failure(e)),
            };
            if item.quantity > available {
                return Err(CheckoutError::InventoryConflict {
                    product_id: item.product_id.clone(),
                    variant_id: item.variant_id.clone(),
                    requested: item.quantity,
                    available,
                });
            }
        }

        let totals = price(cart, voucher.as_ref(), &self.inner.settings.pricing);
        if let Some(expected) = request.expected_total
            && expected != totals.total
        {
            return Err(CheckoutError::PriceMismatch {
                expected,
                actual: totals.total,
                order_id: None,
            });
        }

        Ok(OrderDraft::new(
            cart,
            totals,
            voucher,
            request.customer.clone(),
            request.address.clone(),
            request.payment_method,
            key,
        ))
    }

    /// Submit the draft, regenerating the code once and retrying a
    /// transient failure once.
    async fn place(&self, draft: &OrderDraft) -> Result<(OrderId, String), CheckoutError> {
        let prefix = &self.inner.settings.code_prefix;
        let mut submission = OrderSubmission::from_draft(draft, self.inner.codes.generate(prefix));
        let mut regenerated = false;
        let mut retried = false;

        loop {
            let err = match self.inner.orders.submit_order(&submission).await {
                Ok(receipt) => {
                    if let Some(total) = receipt.total
                        && total != draft.totals().total
                    {
                        error!(
                            order_id = %receipt.order_id,
                            submitted = %draft.totals().total,
                            recorded = %total,
                            "Order store recorded a different total"
                        );
                        return Err(CheckoutError::PriceMismatch {
                            expected: draft.totals().total,
                            actual: total,
                            order_id: Some(receipt.order_id),
                        });
                    }
                    let code = receipt
                        .code
                        .filter(|c| !c.trim().is_empty())
                        .unwrap_or(submission.code);
                    return Ok((receipt.order_id, code));
                }
                Err(e) => e,
            };

            if err.is_conflict(DUPLICATE_ORDER_CODE) && !regenerated {
                regenerated = true;
                let code = self.inner.codes.generate(prefix);
                warn!(
                    rejected = %submission.code,
                    proposed = %code,
                    "Order code taken, regenerating"
                );
                submission.code = code;
                continue;
            }

            if err.is_retryable() && !retried {
                retried = true;
                let delay = self.inner.settings.retry.delay();
                warn!(
                    error = %err,
                    delay_ms = delay.as_millis(),
                    "Order submission failed, retrying"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            return Err(match err {
                BackendError::Rejected { reason, details, .. } => {
                    CheckoutError::RejectedByBackend { reason, details }
                }
                BackendError::Conflict { reason, .. } => CheckoutError::RejectedByBackend {
                    reason,
                    details: None,
                },
                other => backend_failure(other),
            });
        }
    }

    async fn clear_cart(&self, cart: &Cart) {
        let mut store = CartStore::from_snapshot(
            Arc::clone(&self.inner.carts),
            Arc::clone(&self.inner.catalog),
            cart.clone(),
        );
        if let Err(e) = store.clear().await {
            warn!(cart_id = %cart.id, error = %e, "Failed to clear cart after order");
        }
    }
}

/// A backend failure outside the store's business answers.
///
/// A response that could not be parsed may hide a created order, so it is
/// treated like a lost response.
fn backend_failure(e: BackendError) -> CheckoutError {
    match e {
        e @ BackendError::Parse(_) => CheckoutError::TransportFailed(e),
        e if e.is_retryable() => CheckoutError::TransportFailed(e),
        BackendError::NotFound(what) => CheckoutError::RejectedByBackend {
            reason: format!("not found: {what}"),
            details: None,
        },
        other => CheckoutError::RejectedByBackend {
            reason: other.to_string(),
            details: None,
        },
    }
}
