//! Sustainability impact attribution.
//!
//! Buying secondhand avoids the footprint of producing a new garment. The
//! storefront expresses that saving in everyday equivalents per product
//! group. A product's group is found through a fallback chain over its
//! catalog taxonomy, then looked up in the profile table.

use serde::{Deserialize, Serialize};

use crate::types::ProductId;

/// Everyday equivalents of the footprint avoided by buying one item secondhand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EcoImpactProfile {
    pub group: String,
    /// Product type this profile also answers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    pub glasses_of_water: f64,
    pub hours_of_lighting: f64,
    pub kms_of_driving: f64,
}

/// A product's type in the catalog tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductType {
    pub name: String,
    /// Name of the parent category, when the type has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_name: Option<String>,
}

/// The parts of a catalog product the resolver looks at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductTaxonomy {
    pub product_id: ProductId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_type: Option<ProductType>,
    /// Explicit impact-group label set by merchandising.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eco_impact_group: Option<String>,
}

impl ProductTaxonomy {
    /// Group keys to try, in order: the type's parent category, then the
    /// explicit label. Blank values are skipped.
    #[must_use]
    pub fn candidate_keys(&self) -> Vec<&str> {
        let parent = self
            .product_type
            .as_ref()
            .and_then(|t| t.parent_name.as_deref());
        [parent, self.eco_impact_group.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .collect()
    }
}

fn same_key(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// Profile table in priority order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EcoImpactTable {
    entries: Vec<EcoImpactProfile>,
}

impl EcoImpactTable {
    #[must_use]
    pub const fn new(entries: Vec<EcoImpactProfile>) -> Self {
        Self { entries }
    }

    /// Parse a JSON array of profiles.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error for malformed input.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    #[must_use]
    pub fn entries(&self) -> &[EcoImpactProfile] {
        &self.entries
    }

    /// First entry whose group or type name equals `key`.
    #[must_use]
    pub fn lookup(&self, key: &str) -> Option<&EcoImpactProfile> {
        self.entries.iter().find(|entry| {
            same_key(&entry.group, key)
                || entry.type_name.as_deref().is_some_and(|t| same_key(t, key))
        })
    }

    /// Walk the taxonomy's fallback chain and return the first profile found.
    ///
    /// `None` means "show no eco-impact block", not an error.
    #[must_use]
    pub fn resolve(&self, taxonomy: &ProductTaxonomy) -> Option<&EcoImpactProfile> {
        taxonomy
            .candidate_keys()
            .into_iter()
            .find_map(|key| self.lookup(key))
    }

    /// Built-in table used when no table file is configured.
    #[must_use]
    pub fn builtin() -> Self {
        let row = |group: &str, type_name: Option<&str>, water: f64, light: f64, km: f64| {
            EcoImpactProfile {
                group: group.to_owned(),
                type_name: type_name.map(str::to_owned),
                glasses_of_water: water,
                hours_of_lighting: light,
                kms_of_driving: km,
            }
        };
        Self::new(vec![
            row("Dress", Some("Dresses"), 12_600.0, 1_560.0, 98.0),
            row("Top", Some("Tops"), 10_800.0, 940.0, 42.0),
            row("Bottom", Some("Jeans"), 30_000.0, 1_900.0, 120.0),
            row("Outerwear", Some("Jackets"), 27_000.0, 2_800.0, 160.0),
            row("Shoes", Some("Footwear"), 32_000.0, 1_200.0, 70.0),
            row("Bag", Some("Bags"), 18_000.0, 1_100.0, 55.0),
            row("Accessory", Some("Accessories"), 2_400.0, 300.0, 12.0),
        ])
    }
}
