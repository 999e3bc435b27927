//! Wire types for the commerce backend's JSON API.

use serde::{Deserialize, Serialize};

use losia_core::{
    Cart, CartId, CartItem, CartKey, CustomerContact, IdempotencyKey, Money, OrderDraft, OrderId,
    PaymentMethod, PricingBreakdown, ProductId, ShippingAddress, VariantId,
};

/// `{cart, version}` as returned by every cart endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartEnvelope {
    pub cart: CartBody,
    pub version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartBody {
    pub id: CartId,
    #[serde(default)]
    pub items: Vec<CartItem>,
}

impl From<CartEnvelope> for Cart {
    fn from(envelope: CartEnvelope) -> Self {
        Self {
            id: envelope.cart.id,
            items: envelope.cart.items,
            version: envelope.version,
        }
    }
}

/// Body of a cart line write.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineRequest {
    pub expected_version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<ProductId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<VariantId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
    /// Full line for additions, so the backend can record price and metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<CartItem>,
}

/// Error body the backend attaches to 4xx responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub current_version: Option<u64>,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

/// Catalog price and display data for one variant.
///
/// Cart lines are always priced from this, never from the shopper's request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogVariant {
    pub unit_price: Money,
    #[serde(default)]
    pub compare_at_price: Option<Money>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl CatalogVariant {
    #[must_use]
    pub fn into_item(self, key: CartKey, quantity: u32) -> CartItem {
        CartItem {
            product_id: key.product_id,
            variant_id: key.variant_id,
            quantity,
            unit_price: self.unit_price,
            compare_at_price: self.compare_at_price,
            size: self.size,
            title: self.title,
            image_url: self.image_url,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockResponse {
    pub available: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoucherValidationRequest<'a> {
    pub code: &'a str,
    pub cart_snapshot: &'a Cart,
}

/// Order as sent to the order store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSubmission {
    pub cart_id: CartId,
    pub cart_version: u64,
    pub items: Vec<CartItem>,
    pub totals: PricingBreakdown,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voucher_code: Option<String>,
    pub customer: CustomerContact,
    pub address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub idempotency_key: IdempotencyKey,
    /// Proposed order code; the store may keep its own.
    pub code: String,
}

impl OrderSubmission {
    #[must_use]
    pub fn from_draft(draft: &OrderDraft, code: String) -> Self {
        Self {
            cart_id: draft.cart_id().clone(),
            cart_version: draft.cart_version(),
            items: draft.items().to_vec(),
            totals: *draft.totals(),
            voucher_code: draft.voucher().map(|v| v.code.clone()),
            customer: draft.customer().clone(),
            address: draft.address().clone(),
            payment_method: draft.payment_method(),
            idempotency_key: draft.idempotency_key().clone(),
            code,
        }
    }
}

/// What the order store answers for an accepted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderReceipt {
    pub order_id: OrderId,
    /// Code the store recorded, when it differs from or confirms ours.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Total the store computed, when it reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<Money>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_carries_version() {
        let json = r#"{"cart":{"id":"c1","items":[]},"version":7}"#;
        let cart: Cart = serde_json::from_str::<CartEnvelope>(json).unwrap().into();
        assert_eq!(cart.id.as_str(), "c1");
        assert_eq!(cart.version, 7);
        assert!(cart.is_empty());
    }

    #[test]
    fn test_error_body_is_lenient() {
        let body: ErrorBody =
            serde_json::from_str(r#"{"reason":"ConcurrencyConflict","currentVersion":9}"#).unwrap();
        assert_eq!(body.reason.as_deref(), Some("ConcurrencyConflict"));
        assert_eq!(body.current_version, Some(9));

        let empty: ErrorBody = serde_json::from_str("{}").unwrap();
        assert!(empty.reason.is_none());
    }

    #[test]
    fn test_catalog_variant_becomes_line() {
        let variant: CatalogVariant =
            serde_json::from_str(r#"{"unitPrice":"120000","title":"Camisole"}"#).unwrap();
        let item = variant.into_item(CartKey::new("prd-silk-top", "v-s"), 2);
        assert_eq!(item.product_id.as_str(), "prd-silk-top");
        assert_eq!(item.quantity, 2);
        assert_eq!(item.unit_price, Money::from_units(120_000));
        assert!(item.compare_at_price.is_none());
        assert_eq!(item.title.as_deref(), Some("Camisole"));
    }

    #[test]
    fn test_receipt_without_optional_fields() {
        let receipt: OrderReceipt = serde_json::from_str(r#"{"orderId":"o-1"}"#).unwrap();
        assert_eq!(receipt.order_id.as_str(), "o-1");
        assert!(receipt.code.is_none());
        assert!(receipt.total.is_none());
    }
}
