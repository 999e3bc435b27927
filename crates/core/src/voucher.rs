//! Voucher rules and validation outcomes.
//!
//! A voucher is never "applied" state: it is validated against the exact
//! cart snapshot it will price, every time.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::Money;

/// What a voucher does to the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum VoucherKind {
    /// Discount a fraction of the subtotal, e.g. `0.1` for 10%.
    Percent { rate: Decimal },
    /// Discount a fixed amount, capped at the subtotal.
    Fixed { amount: Money },
    /// Waive the shipping fee; no monetary discount.
    FreeShipping,
}

/// A discount rule identified by a code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Voucher {
    pub code: String,
    #[serde(flatten)]
    pub kind: VoucherKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_subtotal: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_limit: Option<u32>,
    /// Redemptions so far, as reported by the rules service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_count: Option<u32>,
}

impl Voucher {
    /// Normalize a shopper-typed code: trimmed and uppercased.
    #[must_use]
    pub fn normalize_code(code: &str) -> String {
        code.trim().to_uppercase()
    }

    /// Check the rule's own constraints against a subtotal at `now`.
    ///
    /// The rules service is authoritative; this only lets the storefront be
    /// stricter than a response that disagrees with the snapshot in hand.
    ///
    /// # Errors
    ///
    /// Returns the first constraint the voucher fails.
    pub fn check(&self, subtotal: Money, now: DateTime<Utc>) -> Result<(), VoucherRejection> {
        if self.expires_at.is_some_and(|expires_at| expires_at <= now) {
            return Err(VoucherRejection::Expired);
        }
        if self.min_subtotal.is_some_and(|min| subtotal < min) {
            return Err(VoucherRejection::MinSubtotalNotMet);
        }
        if let (Some(limit), Some(used)) = (self.usage_limit, self.usage_count)
            && used >= limit
        {
            return Err(VoucherRejection::UsageLimitReached);
        }
        Ok(())
    }
}

/// Why a voucher was rejected. Business-rule outcomes, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error)]
pub enum VoucherRejection {
    #[error("voucher code not found")]
    NotFound,
    #[error("voucher has expired")]
    Expired,
    #[error("cart subtotal is below the voucher minimum")]
    MinSubtotalNotMet,
    #[error("voucher usage limit reached")]
    UsageLimitReached,
}

/// Result of validating a voucher against a cart snapshot.
///
/// Serializes as `{"ok":true,"voucher":{..}}` or `{"ok":false,"reason":".."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "VoucherOutcomeWire", into = "VoucherOutcomeWire")]
pub enum VoucherOutcome {
    Valid(Voucher),
    Rejected(VoucherRejection),
}

impl VoucherOutcome {
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    #[must_use]
    pub const fn voucher(&self) -> Option<&Voucher> {
        match self {
            Self::Valid(voucher) => Some(voucher),
            Self::Rejected(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VoucherOutcomeWire {
    ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    voucher: Option<Voucher>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reason: Option<VoucherRejection>,
}

impl TryFrom<VoucherOutcomeWire> for VoucherOutcome {
    type Error = String;

    fn try_from(wire: VoucherOutcomeWire) -> Result<Self, Self::Error> {
        match (wire.ok, wire.voucher, wire.reason) {
            (true, Some(voucher), _) => Ok(Self::Valid(voucher)),
            (false, _, Some(reason)) => Ok(Self::Rejected(reason)),
            (true, None, _) => Err("ok voucher outcome without a voucher".to_owned()),
            (false, _, None) => Err("rejected voucher outcome without a reason".to_owned()),
        }
    }
}

impl From<VoucherOutcome> for VoucherOutcomeWire {
    fn from(outcome: VoucherOutcome) -> Self {
        match outcome {
            VoucherOutcome::Valid(voucher) => Self {
                ok: true,
                voucher: Some(voucher),
                reason: None,
            },
            VoucherOutcome::Rejected(reason) => Self {
                ok: false,
                voucher: None,
                reason: Some(reason),
            },
        }
    }
}
