//! Eco-impact lookup against a profile table.
//!
//! # Usage
//!
//! ```bash
//! losia eco-impact --group Dress
//! losia eco-impact --group Bag --type-name Accessories --table profiles.json
//! ```

use std::path::Path;

use losia_core::{EcoImpactTable, ProductId, ProductTaxonomy, ProductType};

use super::{CommandError, read_json};

/// Resolve a profile the way a product page would.
///
/// `type_name` stands in for the product type's parent category and is
/// tried before `group`. Prints `null` when nothing matches.
///
/// # Errors
///
/// Returns an error if the table file cannot be read or parsed.
pub fn run(
    group: Option<&str>,
    type_name: Option<&str>,
    table_path: Option<&Path>,
) -> Result<String, CommandError> {
    if group.is_none() && type_name.is_none() {
        return Err(CommandError::InvalidArgument(
            "give --group, --type-name or both".to_string(),
        ));
    }

    let table = match table_path {
        Some(path) => read_json::<EcoImpactTable>(path)?,
        None => EcoImpactTable::builtin(),
    };

    let taxonomy = ProductTaxonomy {
        product_id: ProductId::new("cli"),
        product_type: type_name.map(|parent| ProductType {
            name: parent.to_string(),
            parent_name: Some(parent.to_string()),
        }),
        eco_impact_group: group.map(String::from),
    };

    Ok(serde_json::to_string_pretty(&table.resolve(&taxonomy))?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::Value;

    use super::*;

    #[test]
    fn test_group_resolves_builtin() {
        let output = run(Some("dress"), None, None).unwrap();
        let profile: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(profile["group"], "Dress");
    }

    #[test]
    fn test_type_name_wins_over_group() {
        let output = run(Some("Dress"), Some("Jackets"), None).unwrap();
        let profile: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(profile["group"], "Outerwear");
    }

    #[test]
    fn test_unmatched_is_null() {
        assert_eq!(run(Some("Furniture"), None, None).unwrap(), "null");
    }

    #[test]
    fn test_needs_a_key() {
        assert!(matches!(run(None, None, None), Err(CommandError::InvalidArgument(_))));
    }
}
