//! Order code generation.
//!
//! # Usage
//!
//! ```bash
//! losia order-code
//! losia order-code --prefix SALE --count 5
//! ```

use losia_core::OrderCodeGenerator;

use super::CommandError;

/// Generate `count` codes, one per line.
///
/// # Errors
///
/// Returns [`CommandError::InvalidArgument`] for a zero count.
pub fn run(
    generator: &OrderCodeGenerator,
    prefix: &str,
    count: usize,
) -> Result<String, CommandError> {
    if count == 0 {
        return Err(CommandError::InvalidArgument("--count must be at least 1".to_string()));
    }
    let codes: Vec<String> = (0..count).map(|_| generator.generate(prefix)).collect();
    Ok(codes.join("\n"))
}
