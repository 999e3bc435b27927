//! Eco-impact resolution for a catalog product.

use std::sync::Arc;

use tracing::{debug, instrument};

use losia_core::{EcoImpactProfile, ProductId};

use crate::backend::{BackendError, Catalog, EcoImpactSource};

/// Resolves a product's eco-impact profile through its taxonomy.
#[derive(Clone)]
pub struct EcoImpactResolver {
    catalog: Arc<dyn Catalog>,
    source: Arc<dyn EcoImpactSource>,
}

impl std::fmt::Debug for EcoImpactResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcoImpactResolver").finish_non_exhaustive()
    }
}

impl EcoImpactResolver {
    #[must_use]
    pub fn new(catalog: Arc<dyn Catalog>, source: Arc<dyn EcoImpactSource>) -> Self {
        Self { catalog, source }
    }

    /// The first profile matching the product's candidate group keys.
    ///
    /// `Ok(None)` for an unknown product or when nothing matches.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog or the profile source fails.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn resolve(
        &self,
        product_id: &ProductId,
    ) -> Result<Option<EcoImpactProfile>, BackendError> {
        let Some(taxonomy) = self.catalog.taxonomy(product_id).await? else {
            debug!("Unknown product");
            return Ok(None);
        };

        for key in taxonomy.candidate_keys() {
            if let Some(profile) = self.source.lookup(key).await? {
                debug!(key, group = %profile.group, "Eco-impact group resolved");
                return Ok(Some(profile));
            }
        }

        debug!("No eco-impact group matched");
        Ok(None)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use losia_core::{EcoImpactTable, ProductTaxonomy, ProductType};

    use super::*;
    use crate::backend::MemoryBackend;

    async fn resolver_with(taxonomy: ProductTaxonomy) -> EcoImpactResolver {
        let backend = Arc::new(MemoryBackend::default());
        backend.put_taxonomy(taxonomy).await;
        EcoImpactResolver::new(backend, Arc::new(EcoImpactTable::builtin()))
    }

    fn taxonomy(parent: Option<&str>, label: Option<&str>) -> ProductTaxonomy {
        ProductTaxonomy {
            product_id: ProductId::new("prd-1"),
            product_type: Some(ProductType {
                name: "Wrap".to_string(),
                parent_name: parent.map(String::from),
            }),
            eco_impact_group: label.map(String::from),
        }
    }

    #[tokio::test]
    async fn test_label_without_parent_resolves() {
        let resolver = resolver_with(taxonomy(None, Some("Dress"))).await;
        let profile = resolver.resolve(&ProductId::new("prd-1")).await.unwrap().unwrap();
        assert_eq!(profile.group, "Dress");
    }

    #[tokio::test]
    async fn test_parent_tried_first() {
        let resolver = resolver_with(taxonomy(Some("Outerwear"), Some("Dress"))).await;
        let profile = resolver.resolve(&ProductId::new("prd-1")).await.unwrap().unwrap();
        assert_eq!(profile.group, "Outerwear");
    }

    #[tokio::test]
    async fn test_unknown_product_is_none() {
        let resolver = resolver_with(taxonomy(None, Some("Dress"))).await;
        assert!(resolver.resolve(&ProductId::new("prd-404")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unmatched_groups_are_none() {
        let resolver = resolver_with(taxonomy(Some("Furniture"), Some("Lamps"))).await;
        assert!(resolver.resolve(&ProductId::new("prd-1")).await.unwrap().is_none());
    }
}
