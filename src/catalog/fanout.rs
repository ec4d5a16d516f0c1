//! Cross-category listing and search.
//!
//! Categories are physically partitioned, so a unified catalog is a
//! scatter/gather: enumerate the registry once, read each relation, and
//! concatenate (category order outer, product name inner).
//!
//! The category list is a snapshot. A category registered while a fan-out
//! is running may or may not appear in its result.

use std::sync::Arc;

use crate::backend::CatalogBackend;
use crate::catalog::product::{Product, TaggedProduct};
use crate::catalog::record_outcome;
use crate::catalog::registry::{CategoryRegistry, ResolvedCategory};
use crate::catalog::store::relation_error;
use crate::error::{CatalogError, StoreError};
use crate::metrics::tracing_helpers;

#[derive(Clone)]
pub struct CatalogQuery {
    registry: CategoryRegistry,
    backend: Arc<dyn CatalogBackend>,
}

impl CatalogQuery {
    pub fn new(registry: CategoryRegistry, backend: Arc<dyn CatalogBackend>) -> Self {
        Self { registry, backend }
    }

    /// Every product of every category.
    pub fn list_all(&self) -> Result<Vec<TaggedProduct>, CatalogError> {
        let _span = tracing_helpers::catalog_operation_span("list_products").entered();
        let result = self.gather(|backend, category| backend.list_products(category));
        record_outcome("list_products", &result);
        result
    }

    /// Case-insensitive literal substring search over name and brand.
    pub fn search(&self, term: &str) -> Result<Vec<TaggedProduct>, CatalogError> {
        let _span = tracing_helpers::catalog_operation_span("search_products").entered();
        let term = term.trim();
        if term.is_empty() {
            let result = Err(CatalogError::invalid("search term is required"));
            record_outcome("search_products", &result);
            return result;
        }
        let needle = term.to_lowercase();
        let result = self.gather(|backend, category| backend.search_products(category, &needle));
        record_outcome("search_products", &result);
        result
    }

    fn gather<F>(&self, read: F) -> Result<Vec<TaggedProduct>, CatalogError>
    where
        F: Fn(&dyn CatalogBackend, &ResolvedCategory) -> Result<Vec<Product>, StoreError>,
    {
        let mut all = Vec::new();
        for category in self.registry.list()? {
            let resolved = ResolvedCategory::new(category.name);
            let mut rows = match read(self.backend.as_ref(), &resolved) {
                Ok(rows) => rows,
                Err(StoreError::MissingRelation(msg)) => {
                    log::warn!(
                        "Skipping category '{}' during fan-out, relation missing: {}",
                        resolved.name(),
                        msg
                    );
                    continue;
                }
                Err(e) => return Err(relation_error(&resolved, e)),
            };
            // Backends are not required to order rows.
            rows.sort_by_cached_key(|p| (p.name.to_lowercase(), p.id));
            all.extend(rows.into_iter().map(|product| TaggedProduct {
                category: resolved.name().to_string(),
                product,
            }));
        }
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::catalog::product::ProductDraft;
    use crate::catalog::store::ProductStore;
    use crate::error::ErrorKind;
    use rust_decimal::Decimal;

    struct Fixture {
        store: ProductStore,
        query: CatalogQuery,
        registry: CategoryRegistry,
        backend: Arc<MemoryBackend>,
    }

    fn fixture() -> Fixture {
        let backend = Arc::new(MemoryBackend::new());
        let registry = CategoryRegistry::new(backend.clone());
        Fixture {
            store: ProductStore::new(registry.clone(), backend.clone()),
            query: CatalogQuery::new(registry.clone(), backend.clone()),
            registry,
            backend,
        }
    }

    fn draft(name: &str, brand: Option<&str>) -> ProductDraft {
        ProductDraft {
            name: Some(name.into()),
            brand: brand.map(Into::into),
            classification_code: None,
            unit_price: Some(Decimal::new(4000, 2)),
            units_per_case: Some(12),
        }
    }

    #[test]
    fn test_list_all_orders_category_then_name() {
        let f = fixture();
        f.registry.register("soap").unwrap();
        f.registry.register("biscuits").unwrap();
        f.store.add("soap", draft("Lux", None)).unwrap();
        f.store.add("biscuits", draft("Marie", None)).unwrap();
        f.store.add("biscuits", draft("bourbon", None)).unwrap();

        let rows = f.query.list_all().unwrap();
        let seen: Vec<_> = rows
            .iter()
            .map(|r| (r.category.as_str(), r.product.name.as_str()))
            .collect();
        assert_eq!(
            seen,
            [("biscuits", "bourbon"), ("biscuits", "Marie"), ("soap", "Lux")]
        );
    }

    #[test]
    fn test_same_name_orders_by_id() {
        let f = fixture();
        f.registry.register("soap").unwrap();
        let first = f.store.add("soap", draft("lux", Some("HUL"))).unwrap();
        f.store.add("soap", draft("Dove", None)).unwrap();
        let second = f.store.add("soap", draft("LUX", Some("Unilever"))).unwrap();

        let ids: Vec<_> = f.query.list_all().unwrap().iter().map(|r| r.product.id).collect();
        assert_eq!(ids[1..], [first, second]);
    }

    #[test]
    fn test_search_matches_name_or_brand_case_insensitively() {
        let f = fixture();
        f.registry.register("cold drinks").unwrap();
        f.registry.register("snacks").unwrap();
        f.store.add("cold drinks", draft("Cola 500ml", None)).unwrap();
        f.store.add("snacks", draft("Pepsi Cola", None)).unwrap();
        f.store.add("snacks", draft("Chips", Some("ColaCo"))).unwrap();
        f.store.add("snacks", draft("Namkeen", None)).unwrap();

        let rows = f.query.search("COLA").unwrap();
        let seen: Vec<_> = rows
            .iter()
            .map(|r| (r.category.as_str(), r.product.name.as_str()))
            .collect();
        assert_eq!(
            seen,
            [
                ("cold_drinks", "Cola 500ml"),
                ("snacks", "Chips"),
                ("snacks", "Pepsi Cola")
            ]
        );
    }

    #[test]
    fn test_search_is_literal() {
        let f = fixture();
        f.registry.register("soap").unwrap();
        f.store.add("soap", draft("Lux", None)).unwrap();
        f.store.add("soap", draft("100% Neem", None)).unwrap();

        assert!(f.query.search("%").unwrap().len() == 1);
        assert!(f.query.search("_").unwrap().is_empty());
    }

    #[test]
    fn test_empty_search_term_is_invalid() {
        let f = fixture();
        assert_eq!(f.query.search("").unwrap_err().kind(), ErrorKind::InvalidInput);
        assert_eq!(f.query.search("   ").unwrap_err().kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_missing_relation_is_skipped() {
        let f = fixture();
        f.registry.register("soap").unwrap();
        f.registry.register("biscuits").unwrap();
        f.store.add("soap", draft("Lux", None)).unwrap();
        f.backend.drop_relation("biscuits");

        let rows = f.query.list_all().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].category, "soap");
    }
}
