//! Cart data model.
//!
//! A [`Cart`] is a snapshot of the authoritative cart held by the order
//! store, stamped with the version it was read at. Totals are always derived
//! from the items and never stored.

use serde::{Deserialize, Serialize};

use crate::types::{CartId, Money, ProductId, VariantId};

/// Identity of a cart line: one product variant appears at most once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartKey {
    pub product_id: ProductId,
    pub variant_id: VariantId,
}

impl CartKey {
    #[must_use]
    pub fn new(product_id: impl Into<ProductId>, variant_id: impl Into<VariantId>) -> Self {
        Self {
            product_id: product_id.into(),
            variant_id: variant_id.into(),
        }
    }
}

impl std::fmt::Display for CartKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.product_id, self.variant_id)
    }
}

/// A line in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: ProductId,
    pub variant_id: VariantId,
    /// Always at least 1; a line with quantity 0 is removed instead.
    pub quantity: u32,
    pub unit_price: Money,
    /// Original price before markdown. Absent means "no markdown".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compare_at_price: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl CartItem {
    #[must_use]
    pub fn key(&self) -> CartKey {
        CartKey {
            product_id: self.product_id.clone(),
            variant_id: self.variant_id.clone(),
        }
    }

    #[must_use]
    pub fn matches(&self, key: &CartKey) -> bool {
        self.product_id == key.product_id && self.variant_id == key.variant_id
    }

    /// `unit_price * quantity`.
    #[must_use]
    pub fn line_total(&self) -> Money {
        self.unit_price * self.quantity
    }

    /// Markdown saved on this line; zero when there is no higher compare-at price.
    #[must_use]
    pub fn line_savings(&self) -> Money {
        match self.compare_at_price {
            Some(compare_at) if compare_at > self.unit_price => {
                (compare_at - self.unit_price) * self.quantity
            }
            _ => Money::ZERO,
        }
    }
}

/// Snapshot of a cart at a given version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub id: CartId,
    /// Lines in display order. Order does not affect totals.
    #[serde(default)]
    pub items: Vec<CartItem>,
    /// Monotonically increasing stamp used for optimistic concurrency.
    pub version: u64,
}

impl Cart {
    /// An empty cart at version 0.
    #[must_use]
    pub fn empty(id: impl Into<CartId>) -> Self {
        Self {
            id: id.into(),
            items: Vec::new(),
            version: 0,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|item| item.quantity).sum()
    }

    /// `Σ unit_price * quantity`.
    #[must_use]
    pub fn subtotal(&self) -> Money {
        self.items.iter().map(CartItem::line_total).sum()
    }

    /// `Σ (compare_at_price - unit_price) * quantity` over marked-down lines.
    #[must_use]
    pub fn savings(&self) -> Money {
        self.items.iter().map(CartItem::line_savings).sum()
    }

    #[must_use]
    pub fn find(&self, key: &CartKey) -> Option<&CartItem> {
        self.items.iter().find(|item| item.matches(key))
    }

    /// Quantity currently held for `key`, zero if absent.
    #[must_use]
    pub fn quantity_of(&self, key: &CartKey) -> u32 {
        self.find(key).map_or(0, |item| item.quantity)
    }

    /// Add `quantity` units of `item`, merging into an existing line.
    ///
    /// The item's own `quantity` field is ignored in favor of `quantity`;
    /// price fields of an existing line are refreshed from `item`.
    pub fn add(&mut self, item: CartItem, quantity: u32) {
        let key = item.key();
        if let Some(existing) = self.items.iter_mut().find(|line| line.matches(&key)) {
            existing.quantity = existing.quantity.saturating_add(quantity);
            existing.unit_price = item.unit_price;
            existing.compare_at_price = item.compare_at_price;
        } else {
            self.items.push(CartItem { quantity, ..item });
        }
    }

    /// Set the quantity of an existing line; zero removes it.
    ///
    /// Returns `false` when the line does not exist.
    pub fn set_quantity(&mut self, key: &CartKey, quantity: u32) -> bool {
        if quantity == 0 {
            return self.remove(key);
        }
        match self.items.iter_mut().find(|line| line.matches(key)) {
            Some(line) => {
                line.quantity = quantity;
                true
            }
            None => false,
        }
    }

    /// Remove a line. Returns `false` when the line does not exist.
    pub fn remove(&mut self, key: &CartKey) -> bool {
        let before = self.items.len();
        self.items.retain(|line| !line.matches(key));
        self.items.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(product: &str, price: i64, compare_at: Option<i64>) -> CartItem {
        CartItem {
            product_id: ProductId::new(product),
            variant_id: VariantId::new("default"),
            quantity: 1,
            unit_price: Money::from_units(price),
            compare_at_price: compare_at.map(Money::from_units),
            size: None,
            title: None,
            image_url: None,
        }
    }

    #[test]
    fn test_subtotal_and_savings() {
        let mut cart = Cart::empty("c1");
        cart.add(item("dress", 100_000, Some(180_000)), 2);
        cart.add(item("scarf", 50_000, None), 1);
        // compare-at lower than price contributes nothing
        cart.add(item("belt", 70_000, Some(60_000)), 3);

        assert_eq!(cart.subtotal(), Money::from_units(460_000));
        assert_eq!(cart.savings(), Money::from_units(160_000));
        assert_eq!(cart.item_count(), 6);
    }

    #[test]
    fn test_add_merges_same_key() {
        let mut cart = Cart::empty("c1");
        cart.add(item("dress", 100_000, None), 1);
        cart.add(item("dress", 100_000, None), 2);
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.quantity_of(&CartKey::new("dress", "default")), 3);
    }

    #[test]
    fn test_set_quantity_zero_removes() {
        let mut cart = Cart::empty("c1");
        cart.add(item("dress", 100_000, None), 1);
        let key = CartKey::new("dress", "default");
        assert!(cart.set_quantity(&key, 0));
        assert!(cart.is_empty());
        assert!(!cart.set_quantity(&key, 2));
        assert!(!cart.remove(&key));
    }

    #[test]
    fn test_empty_cart_totals_are_zero() {
        let cart = Cart::empty("c1");
        assert_eq!(cart.subtotal(), Money::ZERO);
        assert_eq!(cart.savings(), Money::ZERO);
    }
}
