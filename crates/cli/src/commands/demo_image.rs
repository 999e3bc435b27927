//! Demo image assignment preview.
//!
//! # Usage
//!
//! ```bash
//! losia demo-image prd-linen-dress --index 2
//! losia demo-image blog-42 --pool /a.jpg,/b.jpg,/c.jpg
//! ```

use losia_core::DemoImageAssigner;

use super::CommandError;

/// The image `id` gets at `index`, with its slot number.
///
/// # Errors
///
/// Returns [`CommandError::DemoImage`] if `pool` is given but empty.
pub fn run(id: &str, index: i64, pool: Option<Vec<String>>) -> Result<String, CommandError> {
    let assigner = match pool {
        Some(pool) => DemoImageAssigner::new(
            pool.into_iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
        )?,
        None => DemoImageAssigner::with_default_pool(),
    };
    let slot = assigner.slot(id, index);
    Ok(format!("{} (slot {slot})", assigner.assign(id, index)))
}
