//! Voucher validation against the rules service.
//!
//! Every validation is a round-trip with the exact cart snapshot it will
//! price. Responses can arrive out of order, or after the cart has changed;
//! a [`ValidationTracker`] per cart decides whether a response still
//! describes the cart the shopper is looking at.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::future::Cache;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use losia_core::{Cart, CartId, Clock, Voucher, VoucherOutcome, VoucherRejection};

use crate::backend::{BackendError, VoucherRules};

/// Errors from a voucher validation round-trip.
///
/// Business rejections are not errors; they come back as
/// [`VoucherOutcome::Rejected`].
#[derive(Debug, Error)]
pub enum VoucherError {
    /// The rules service could not be reached.
    #[error("voucher rules unavailable: {0}")]
    TransportFailed(#[source] BackendError),

    /// A newer validation or cart change superseded this response.
    #[error("validation #{sequence} superseded (latest #{latest})")]
    Stale { sequence: u64, latest: u64 },

    #[error("validation cancelled")]
    Cancelled,
}

// =============================================================================
// Sequence correlation
// =============================================================================

/// Identifies one validation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationTicket {
    pub sequence: u64,
    /// Cart version the request was issued against.
    pub cart_version: u64,
}

/// Tracks the latest validation request and cart version for one cart.
#[derive(Debug, Default)]
pub struct ValidationTracker {
    latest_sequence: AtomicU64,
    cart_version: AtomicU64,
}

impl ValidationTracker {
    #[must_use]
    pub const fn new(cart_version: u64) -> Self {
        Self {
            latest_sequence: AtomicU64::new(0),
            cart_version: AtomicU64::new(cart_version),
        }
    }

    /// Record a cart version. Versions only move forward.
    pub fn observe_version(&self, version: u64) {
        self.cart_version.fetch_max(version, Ordering::SeqCst);
    }

    /// Start a new request against `cart_version`, superseding older ones.
    pub fn issue(&self, cart_version: u64) -> ValidationTicket {
        self.observe_version(cart_version);
        let sequence = self.latest_sequence.fetch_add(1, Ordering::SeqCst) + 1;
        ValidationTicket {
            sequence,
            cart_version,
        }
    }

    /// Whether a response to `ticket` may still be shown.
    #[must_use]
    pub fn is_current(&self, ticket: &ValidationTicket) -> bool {
        ticket.sequence == self.latest_sequence()
            && ticket.cart_version == self.cart_version.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn latest_sequence(&self) -> u64 {
        self.latest_sequence.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn cart_version(&self) -> u64 {
        self.cart_version.load(Ordering::SeqCst)
    }
}

/// Per-cart trackers, evicted after an hour without use.
#[derive(Clone)]
pub struct ValidationTrackers {
    trackers: Cache<CartId, Arc<ValidationTracker>>,
}

impl Default for ValidationTrackers {
    fn default() -> Self {
        Self {
            trackers: Cache::builder()
                .max_capacity(100_000)
                .time_to_idle(Duration::from_secs(3600))
                .build(),
        }
    }
}

impl ValidationTrackers {
    /// The tracker for `cart`, created at the cart's version if absent.
    pub async fn for_cart(&self, cart: &Cart) -> Arc<ValidationTracker> {
        let version = cart.version;
        let tracker = self
            .trackers
            .get_with(cart.id.clone(), async move {
                Arc::new(ValidationTracker::new(version))
            })
            .await;
        tracker.observe_version(version);
        tracker
    }
}

// =============================================================================
// VoucherValidator
// =============================================================================

/// An accepted validation response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoucherCheck {
    pub sequence: u64,
    pub cart_version: u64,
    pub outcome: VoucherOutcome,
}

/// Validates voucher codes against cart snapshots.
#[derive(Clone)]
pub struct VoucherValidator {
    rules: Arc<dyn VoucherRules>,
    clock: Arc<dyn Clock>,
}

impl VoucherValidator {
    #[must_use]
    pub fn new(rules: Arc<dyn VoucherRules>, clock: Arc<dyn Clock>) -> Self {
        Self { rules, clock }
    }

    /// Validate `code` against exactly `cart`.
    ///
    /// Blank codes are `NotFound` without a round-trip. A `Valid` answer is
    /// checked again locally and downgraded if the snapshot fails the
    /// voucher's own constraints.
    ///
    /// # Errors
    ///
    /// Returns [`VoucherError::TransportFailed`] if the rules service is
    /// unreachable.
    #[instrument(skip(self, cart), fields(cart_id = %cart.id, cart_version = cart.version))]
    pub async fn validate(&self, code: &str, cart: &Cart) -> Result<VoucherOutcome, VoucherError> {
        let code = Voucher::normalize_code(code);
        if code.is_empty() {
            return Ok(VoucherOutcome::Rejected(VoucherRejection::NotFound));
        }

        let outcome = self.rules.validate(&code, cart).await.map_err(|e| {
            warn!(error = %e, "Voucher validation failed");
            VoucherError::TransportFailed(e)
        })?;

        Ok(self.local_guard(outcome, cart))
    }

    /// Validate and correlate the response with `tracker`.
    ///
    /// # Errors
    ///
    /// [`VoucherError::Stale`] when another validation was issued or the
    /// cart changed while this one was in flight; the response must be
    /// discarded. [`VoucherError::Cancelled`] when `cancel` fires first.
    pub async fn validate_tracked(
        &self,
        tracker: &ValidationTracker,
        code: &str,
        cart: &Cart,
        cancel: Option<&CancellationToken>,
    ) -> Result<VoucherCheck, VoucherError> {
        let ticket = tracker.issue(cart.version);

        let outcome = match cancel {
            Some(token) => tokio::select! {
                () = token.cancelled() => return Err(VoucherError::Cancelled),
                result = self.validate(code, cart) => result?,
            },
            None => self.validate(code, cart).await?,
        };

        if !tracker.is_current(&ticket) {
            debug!(
                sequence = ticket.sequence,
                latest = tracker.latest_sequence(),
                "Discarding stale voucher response"
            );
            return Err(VoucherError::Stale {
                sequence: ticket.sequence,
                latest: tracker.latest_sequence(),
            });
        }

        Ok(VoucherCheck {
            sequence: ticket.sequence,
            cart_version: ticket.cart_version,
            outcome,
        })
    }

    fn local_guard(&self, outcome: VoucherOutcome, cart: &Cart) -> VoucherOutcome {
        match outcome {
            VoucherOutcome::Valid(voucher) => {
                match voucher.check(cart.subtotal(), self.clock.now()) {
                    Ok(()) => VoucherOutcome::Valid(voucher),
                    Err(reason) => {
                        debug!(
                            code = %voucher.code,
                            reason = %reason,
                            "Local voucher check is stricter"
                        );
                        VoucherOutcome::Rejected(reason)
                    }
                }
            }
            rejected @ VoucherOutcome::Rejected(_) => rejected,
        }
    }
}

impl std::fmt::Debug for VoucherValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoucherValidator").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use rust_decimal::Decimal;
    use tokio::sync::Notify;

    use losia_core::clock::FixedClock;
    use losia_core::{Money, VoucherKind};

    use super::*;
    use crate::backend::memory::line;

    /// Answers `Valid(voucher)` for every code once `gate` is notified.
    struct GatedRules {
        voucher: Voucher,
        gate: Option<Arc<Notify>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl VoucherRules for GatedRules {
        async fn validate(
            &self,
            _code: &str,
            _cart: &Cart,
        ) -> Result<VoucherOutcome, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            Ok(VoucherOutcome::Valid(self.voucher.clone()))
        }
    }

    struct DownRules;

    #[async_trait]
    impl VoucherRules for DownRules {
        async fn validate(
            &self,
            _code: &str,
            _cart: &Cart,
        ) -> Result<VoucherOutcome, BackendError> {
            Err(BackendError::Unavailable("HTTP 503".to_string()))
        }
    }

    fn percent(code: &str) -> Voucher {
        Voucher {
            code: code.to_string(),
            kind: VoucherKind::Percent {
                rate: Decimal::new(1, 1),
            },
            min_subtotal: None,
            expires_at: None,
            usage_limit: None,
            usage_count: None,
        }
    }

    fn clock() -> Arc<FixedClock> {
        Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()))
    }

    fn cart_at(version: u64) -> Cart {
        let mut cart = Cart::empty("c1");
        cart.add(line("p1", "v1", 1, 200_000), 1);
        cart.version = version;
        cart
    }

    fn validator(
        voucher: Voucher,
        gate: Option<Arc<Notify>>,
    ) -> (VoucherValidator, Arc<GatedRules>) {
        let rules = Arc::new(GatedRules {
            voucher,
            gate,
            calls: AtomicUsize::new(0),
        });
        (VoucherValidator::new(rules.clone(), clock()), rules)
    }

    #[tokio::test]
    async fn test_blank_code_skips_round_trip() {
        let (validator, rules) = validator(percent("SALE10"), None);
        let outcome = validator.validate("   ", &cart_at(1)).await.unwrap();
        assert_eq!(outcome, VoucherOutcome::Rejected(VoucherRejection::NotFound));
        assert_eq!(rules.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_local_guard_downgrades_expired() {
        let expired = Voucher {
            expires_at: Some(
                Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap() - ChronoDuration::hours(1),
            ),
            ..percent("OLD")
        };
        let (validator, _) = validator(expired, None);
        let outcome = validator.validate("old", &cart_at(1)).await.unwrap();
        assert_eq!(outcome, VoucherOutcome::Rejected(VoucherRejection::Expired));
    }

    #[tokio::test]
    async fn test_local_guard_checks_min_subtotal() {
        let min = Voucher {
            min_subtotal: Some(Money::from_units(500_000)),
            ..percent("BIG")
        };
        let (validator, _) = validator(min, None);
        let outcome = validator.validate("BIG", &cart_at(1)).await.unwrap();
        assert_eq!(outcome, VoucherOutcome::Rejected(VoucherRejection::MinSubtotalNotMet));
    }

    #[tokio::test]
    async fn test_transport_failure() {
        let validator = VoucherValidator::new(Arc::new(DownRules), clock());
        let err = validator.validate("SALE10", &cart_at(1)).await.unwrap_err();
        assert!(matches!(err, VoucherError::TransportFailed(_)));
    }

    #[tokio::test]
    async fn test_response_after_cart_change_is_stale() {
        let gate = Arc::new(Notify::new());
        let (validator, _) = validator(percent("SALE10"), Some(gate.clone()));
        let tracker = Arc::new(ValidationTracker::new(3));

        let task = {
            let validator = validator.clone();
            let tracker = tracker.clone();
            tokio::spawn(async move {
                validator
                    .validate_tracked(&tracker, "SALE10", &cart_at(3), None)
                    .await
            })
        };

        // the cart moves to v4 while the request is in flight
        while tracker.latest_sequence() == 0 {
            tokio::task::yield_now().await;
        }
        tracker.observe_version(4);
        gate.notify_one();

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, VoucherError::Stale { sequence: 1, .. }));
    }

    #[tokio::test]
    async fn test_newer_request_supersedes_older() {
        let gate = Arc::new(Notify::new());
        let (validator, _) = validator(percent("SALE10"), Some(gate.clone()));
        let tracker = Arc::new(ValidationTracker::new(3));

        let first = {
            let validator = validator.clone();
            let tracker = tracker.clone();
            tokio::spawn(async move {
                validator
                    .validate_tracked(&tracker, "SALE10", &cart_at(3), None)
                    .await
            })
        };
        while tracker.latest_sequence() == 0 {
            tokio::task::yield_now().await;
        }

        let second = {
            let validator = validator.clone();
            let tracker = tracker.clone();
            tokio::spawn(async move {
                validator
                    .validate_tracked(&tracker, "SALE10", &cart_at(3), None)
                    .await
            })
        };
        while tracker.latest_sequence() == 1 {
            tokio::task::yield_now().await;
        }

        gate.notify_waiters();
        gate.notify_one();

        assert!(matches!(
            first.await.unwrap(),
            Err(VoucherError::Stale { sequence: 1, latest: 2 })
        ));
        let check = second.await.unwrap().unwrap();
        assert_eq!(check.sequence, 2);
        assert!(check.outcome.is_valid());
    }

    #[tokio::test]
    async fn test_current_response_accepted() {
        let (validator, _) = validator(percent("SALE10"), None);
        let tracker = ValidationTracker::new(3);
        let check = validator
            .validate_tracked(&tracker, "sale10", &cart_at(3), None)
            .await
            .unwrap();
        assert_eq!(check.cart_version, 3);
        assert!(check.outcome.is_valid());
    }

    #[tokio::test]
    async fn test_cancellation() {
        let gate = Arc::new(Notify::new());
        let (validator, _) = validator(percent("SALE10"), Some(gate));
        let tracker = ValidationTracker::new(1);
        let token = CancellationToken::new();
        token.cancel();

        let err = validator
            .validate_tracked(&tracker, "SALE10", &cart_at(1), Some(&token))
            .await
            .unwrap_err();
        assert!(matches!(err, VoucherError::Cancelled));
    }

    #[tokio::test]
    async fn test_trackers_follow_cart_versions() {
        let trackers = ValidationTrackers::default();
        let tracker = trackers.for_cart(&cart_at(2)).await;
        assert_eq!(tracker.cart_version(), 2);

        let same = trackers.for_cart(&cart_at(5)).await;
        assert!(Arc::ptr_eq(&tracker, &same));
        assert_eq!(tracker.cart_version(), 5);
    }
}
