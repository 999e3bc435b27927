//! Newtype IDs for type-safe entity references.
//!
//! Catalog and order identifiers are opaque strings issued by the external
//! order/catalog store. Use the `define_id!` macro to create wrappers that
//! prevent accidentally mixing IDs from different entity types.

use core::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Macro to define a type-safe string ID wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Conversion methods: `new()`, `as_str()`, `into_inner()`
/// - `From<&str>`, `From<String>` and `Display` implementations
///
/// # Example
///
/// ```rust
/// # use losia_core::define_id;
/// define_id!(ListingId);
/// define_id!(SellerId);
///
/// let listing = ListingId::new("lst_1");
/// let seller = SellerId::new("lst_1");
///
/// // These are different types, so this won't compile:
/// // let _: ListingId = seller;
/// assert_eq!(listing.as_str(), seller.as_str());
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new ID from any string-like value.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the underlying string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the ID and return the underlying string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id!(ProductId);
define_id!(VariantId);
define_id!(CartId);
define_id!(OrderId);

/// Key that makes a checkout submission safe to repeat.
///
/// Stable for one checkout attempt and regenerated only when the shopper
/// explicitly starts a new attempt. The order store uses it to collapse
/// retried submissions into a single order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

/// Longest idempotency key accepted from a client.
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;

/// A client-supplied idempotency key was empty, too long, or used characters
/// outside `[A-Za-z0-9._-]`.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("idempotency key must be 1 to 128 letters, digits, '-', '_' or '.'")]
pub struct InvalidIdempotencyKey;

impl IdempotencyKey {
    /// Generate a fresh key for a new checkout attempt.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap a key that is already known to be well formed.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Validate a key supplied over the wire.
    ///
    /// Surrounding whitespace is trimmed. The key is forwarded as an upstream
    /// header, so it is limited to a short token alphabet.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidIdempotencyKey`] when the trimmed key is empty, longer
    /// than [`MAX_IDEMPOTENCY_KEY_LEN`], or contains other characters.
    pub fn parse(raw: &str) -> Result<Self, InvalidIdempotencyKey> {
        let key = raw.trim();
        let acceptable = !key.is_empty()
            && key.len() <= MAX_IDEMPOTENCY_KEY_LEN
            && key
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));
        if acceptable {
            Ok(Self(key.to_owned()))
        } else {
            Err(InvalidIdempotencyKey)
        }
    }

    /// Borrow the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_display_and_serde_are_transparent() {
        let id = ProductId::new("prd_42");
        assert_eq!(id.to_string(), "prd_42");
        assert_eq!(serde_json::to_string(&id).ok().as_deref(), Some("\"prd_42\""));
    }

    #[test]
    fn test_generated_idempotency_keys_differ() {
        let a = IdempotencyKey::generate();
        let b = IdempotencyKey::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
        assert_eq!(IdempotencyKey::parse(a.as_str()), Ok(a));
    }

    #[test]
    fn test_idempotency_key_parse_bounds() {
        assert_eq!(
            IdempotencyKey::parse("  attempt_1.retry-2 ").map(|k| k.as_str().to_owned()),
            Ok("attempt_1.retry-2".to_owned())
        );
        assert!(IdempotencyKey::parse(&"k".repeat(MAX_IDEMPOTENCY_KEY_LEN)).is_ok());

        let too_long = "k".repeat(MAX_IDEMPOTENCY_KEY_LEN + 1);
        for bad in ["", "   ", "key with space", "key\nInjected: 1", "käse", too_long.as_str()] {
            assert_eq!(IdempotencyKey::parse(bad), Err(InvalidIdempotencyKey), "{bad:?}");
        }
    }
}
