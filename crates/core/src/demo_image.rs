//! Deterministic fallback imagery.
//!
//! When a listing has no real photo, the storefront shows one from a fixed
//! pool of demo images. The choice is a pure function of the listing id and
//! the image's position, so the same listing shows the same picture on every
//! render and every device.

use thiserror::Error;

/// Errors building a [`DemoImageAssigner`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DemoImageError {
    #[error("demo image pool cannot be empty")]
    EmptyPool,
}

/// djb2 over UTF-16 code units with 32-bit signed wrap-around.
///
/// `h = 5381; h = h * 33 + unit` per unit, wrapping like a JavaScript
/// `(h << 5) + h + c` in a 32-bit integer, then the absolute value. The
/// result is widened to `i64` so `|i32::MIN|` does not overflow.
#[must_use]
pub fn djb2(input: &str) -> i64 {
    let hash = input.encode_utf16().fold(5381_i32, |h, unit| {
        h.wrapping_shl(5).wrapping_add(h).wrapping_add(i32::from(unit))
    });
    i64::from(hash).abs()
}

/// Picks fallback images from a fixed pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoImageAssigner {
    pool: Vec<String>,
}

impl DemoImageAssigner {
    /// Build an assigner over `pool`.
    ///
    /// # Errors
    ///
    /// Returns [`DemoImageError::EmptyPool`] when `pool` is empty.
    pub fn new(pool: Vec<String>) -> Result<Self, DemoImageError> {
        if pool.is_empty() {
            return Err(DemoImageError::EmptyPool);
        }
        Ok(Self { pool })
    }

    /// The built-in pool: `/static/images/demo/demo-01.jpg` .. `demo-12.jpg`.
    #[must_use]
    pub fn with_default_pool() -> Self {
        Self {
            pool: default_pool(),
        }
    }

    #[must_use]
    pub fn pool(&self) -> &[String] {
        &self.pool
    }

    /// Index into the pool for `(id, index)`.
    #[must_use]
    pub fn slot(&self, id: &str, index: i64) -> usize {
        let size = i64::try_from(self.pool.len()).unwrap_or(i64::MAX);
        let slot = (djb2(id).wrapping_add(index)).rem_euclid(size);
        usize::try_from(slot).unwrap_or(0)
    }

    /// Image path for the `index`-th image of listing `id`.
    #[must_use]
    pub fn assign(&self, id: &str, index: i64) -> &str {
        let slot = self.slot(id, index);
        self.pool
            .get(slot)
            .or_else(|| self.pool.first())
            .map_or("", String::as_str)
    }
}

impl Default for DemoImageAssigner {
    fn default() -> Self {
        Self::with_default_pool()
    }
}

/// Paths of the built-in demo images.
#[must_use]
pub fn default_pool() -> Vec<String> {
    (1..=12)
        .map(|n| format!("/static/images/demo/demo-{n:02}.jpg"))
        .collect()
}
