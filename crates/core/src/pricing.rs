//! Pricing engine.
//!
//! [`price`] is the single source of truth for every total the shopper sees
//! and every total the order store receives. It is a pure function: the cart
//! page and the checkout submission call it with the same inputs and must
//! get the same answer.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::cart::Cart;
use crate::types::Money;
use crate::voucher::{Voucher, VoucherKind};

/// Store-wide shipping rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingPolicy {
    /// Subtotal at or above which shipping is free.
    pub free_shipping_threshold: Money,
    /// Flat shipping fee charged below the threshold.
    pub shipping_fee: Money,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            free_shipping_threshold: Money::from_units(500_000),
            shipping_fee: Money::from_units(30_000),
        }
    }
}

/// Computed totals for a cart snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingBreakdown {
    pub subtotal: Money,
    /// Markdown savings against compare-at prices (informational).
    pub savings: Money,
    /// Voucher discount.
    pub discount: Money,
    pub shipping_fee: Money,
    /// `subtotal - discount + shipping_fee`.
    pub total: Money,
    /// How much more the shopper must add to get free shipping.
    pub free_shipping_remainder: Money,
}

/// Price a cart snapshot with an optional voucher.
///
/// - `Percent` discounts `subtotal × rate` (rate clamped to `[0, 1]`,
///   truncated to whole units), never more than the subtotal.
/// - `Fixed` discounts `min(amount, subtotal)`.
/// - `FreeShipping` discounts nothing and zeroes the shipping fee.
/// - Reaching the free-shipping threshold zeroes the shipping fee regardless
///   of voucher. An empty cart ships nothing and is charged nothing.
#[must_use]
pub fn price(cart: &Cart, voucher: Option<&Voucher>, policy: &PricingPolicy) -> PricingBreakdown {
    let subtotal = cart.subtotal();
    let savings = cart.savings();

    let discount = voucher.map_or(Money::ZERO, |voucher| discount_for(&voucher.kind, subtotal));

    let free_shipping_remainder = policy.free_shipping_threshold.saturating_sub(subtotal);
    let waives_shipping = voucher.is_some_and(|v| matches!(v.kind, VoucherKind::FreeShipping));
    let shipping_fee = if cart.is_empty()
        || waives_shipping
        || subtotal >= policy.free_shipping_threshold
    {
        Money::ZERO
    } else {
        policy.shipping_fee
    };

    PricingBreakdown {
        subtotal,
        savings,
        discount,
        shipping_fee,
        total: subtotal.saturating_sub(discount) + shipping_fee,
        free_shipping_remainder,
    }
}

fn discount_for(kind: &VoucherKind, subtotal: Money) -> Money {
    match kind {
        VoucherKind::Percent { rate } => {
            let rate = (*rate).clamp(Decimal::ZERO, Decimal::ONE);
            subtotal.apply_rate(rate).min(subtotal)
        }
        VoucherKind::Fixed { amount } => {
            if amount.is_negative() {
                Money::ZERO
            } else {
                (*amount).min(subtotal)
            }
        }
        VoucherKind::FreeShipping => Money::ZERO,
    }
}
