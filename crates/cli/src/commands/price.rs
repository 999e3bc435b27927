//! Price a cart file the way checkout would.
//!
//! # Usage
//!
//! ```bash
//! losia price cart.json
//! losia price cart.json --voucher sale10.json --threshold 400000
//! ```
//!
//! `cart.json` holds a cart snapshot (`{id, items, version}`); the voucher
//! file holds a single voucher rule.

use std::path::Path;

use losia_core::{Cart, Clock, PricingPolicy, SystemClock, Voucher, price};

use super::{CommandError, read_json};

/// Price the cart, checking the voucher's own constraints first.
///
/// # Errors
///
/// Returns an error for unreadable files or a voucher the cart does not
/// qualify for.
pub fn run(
    cart_path: &Path,
    voucher_path: Option<&Path>,
    policy: &PricingPolicy,
    clock: &dyn Clock,
) -> Result<String, CommandError> {
    let cart: Cart = read_json(cart_path)?;
    let voucher: Option<Voucher> = voucher_path.map(read_json::<Voucher>).transpose()?;

    if let Some(voucher) = &voucher {
        voucher
            .check(cart.subtotal(), clock.now())
            .map_err(|reason| CommandError::VoucherRejected {
                code: voucher.code.clone(),
                reason,
            })?;
    }

    let breakdown = price(&cart, voucher.as_ref(), policy);
    tracing::debug!(cart_id = %cart.id, total = %breakdown.total, "Cart priced");
    Ok(serde_json::to_string_pretty(&breakdown)?)
}

/// [`run`] against the system clock.
///
/// # Errors
///
/// See [`run`].
pub fn run_now(
    cart_path: &Path,
    voucher_path: Option<&Path>,
    policy: &PricingPolicy,
) -> Result<String, CommandError> {
    run(cart_path, voucher_path, policy, &SystemClock)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::PathBuf;

    use losia_core::Money;
    use serde_json::{Value, json};

    use super::*;

    fn write_temp(name: &str, value: &Value) -> PathBuf {
        let path = std::env::temp_dir().join(format!("losia-cli-{}-{name}", std::process::id()));
        std::fs::write(&path, value.to_string()).unwrap();
        path
    }

    fn cart_file(name: &str) -> PathBuf {
        write_temp(
            name,
            &json!({
                "id": "cart-1",
                "version": 2,
                "items": [
                    {
                        "productId": "p1",
                        "variantId": "v1",
                        "quantity": 2,
                        "unitPrice": "100000",
                        "compareAtPrice": "120000"
                    },
                    {"productId": "p2", "variantId": "v2", "quantity": 1, "unitPrice": "50000"}
                ]
            }),
        )
    }

    #[test]
    fn test_price_without_voucher() {
        let cart = cart_file("plain.json");
        let output = run_now(&cart, None, &PricingPolicy::default()).unwrap();
        let breakdown: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(breakdown["subtotal"], "250000");
        assert_eq!(breakdown["savings"], "40000");
        assert_eq!(breakdown["shippingFee"], "30000");
        assert_eq!(breakdown["total"], "280000");
        assert_eq!(breakdown["freeShippingRemainder"], "250000");
    }

    #[test]
    fn test_price_with_fixed_voucher_and_custom_policy() {
        let cart = cart_file("fixed.json");
        let voucher = write_temp(
            "fixed-voucher.json",
            &json!({"code": "GIAM50K", "kind": "fixed", "amount": "50000"}),
        );
        let policy = PricingPolicy {
            free_shipping_threshold: Money::from_units(200_000),
            shipping_fee: Money::from_units(30_000),
        };
        let output = run_now(&cart, Some(&voucher), &policy).unwrap();
        let breakdown: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(breakdown["discount"], "50000");
        assert_eq!(breakdown["shippingFee"], "0");
        assert_eq!(breakdown["total"], "200000");
    }

    #[test]
    fn test_unqualified_voucher_refused() {
        let cart = cart_file("min.json");
        let voucher = write_temp(
            "min-voucher.json",
            &json!({"code": "BIG", "kind": "fixed", "amount": "50000", "minSubtotal": "1000000"}),
        );
        let err = run_now(&cart, Some(&voucher), &PricingPolicy::default()).unwrap_err();
        assert!(matches!(err, CommandError::VoucherRejected { .. }));
    }

    #[test]
    fn test_missing_file_reported() {
        let err = run_now(Path::new("/nonexistent/cart.json"), None, &PricingPolicy::default())
            .unwrap_err();
        assert!(matches!(err, CommandError::Read { .. }));
    }
}
