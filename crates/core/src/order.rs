//! Order draft and placed order.

use serde::{Deserialize, Serialize};

use crate::cart::{Cart, CartItem};
use crate::pricing::PricingBreakdown;
use crate::types::{
    CartId, CustomerContact, IdempotencyKey, OrderId, OrderStatus, PaymentMethod, ShippingAddress,
};
use crate::voucher::Voucher;

/// Immutable snapshot of an order about to be submitted.
///
/// Fields are private; once built, a draft can only be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDraft {
    cart_id: CartId,
    cart_version: u64,
    items: Vec<CartItem>,
    totals: PricingBreakdown,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    voucher: Option<Voucher>,
    customer: CustomerContact,
    address: ShippingAddress,
    payment_method: PaymentMethod,
    idempotency_key: IdempotencyKey,
}

impl OrderDraft {
    /// Snapshot `cart` together with the totals computed for it.
    #[must_use]
    pub fn new(
        cart: &Cart,
        totals: PricingBreakdown,
        voucher: Option<Voucher>,
        customer: CustomerContact,
        address: ShippingAddress,
        payment_method: PaymentMethod,
        idempotency_key: IdempotencyKey,
    ) -> Self {
        Self {
            cart_id: cart.id.clone(),
            cart_version: cart.version,
            items: cart.items.clone(),
            totals,
            voucher,
            customer,
            address,
            payment_method,
            idempotency_key,
        }
    }

    #[must_use]
    pub const fn cart_id(&self) -> &CartId {
        &self.cart_id
    }

    #[must_use]
    pub const fn cart_version(&self) -> u64 {
        self.cart_version
    }

    #[must_use]
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    #[must_use]
    pub const fn totals(&self) -> &PricingBreakdown {
        &self.totals
    }

    #[must_use]
    pub const fn voucher(&self) -> Option<&Voucher> {
        self.voucher.as_ref()
    }

    #[must_use]
    pub const fn customer(&self) -> &CustomerContact {
        &self.customer
    }

    #[must_use]
    pub const fn address(&self) -> &ShippingAddress {
        &self.address
    }

    #[must_use]
    pub const fn payment_method(&self) -> PaymentMethod {
        self.payment_method
    }

    #[must_use]
    pub const fn idempotency_key(&self) -> &IdempotencyKey {
        &self.idempotency_key
    }
}

/// An order the order store has accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub code: String,
    pub draft: OrderDraft,
    pub status: OrderStatus,
}
