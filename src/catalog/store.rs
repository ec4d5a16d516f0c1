//! Product CRUD within one category relation.
//!
//! Every operation resolves the caller's label through the registry first;
//! the backend only ever sees the resulting [`ResolvedCategory`].

use std::sync::Arc;

use crate::backend::CatalogBackend;
use crate::catalog::product::{NewProduct, Product, ProductDraft, ProductPatch, ValidPatch};
use crate::catalog::record_outcome;
use crate::catalog::registry::{CategoryRegistry, ResolvedCategory};
use crate::error::{CatalogError, StoreError};
use crate::metrics::tracing_helpers;

#[derive(Clone)]
pub struct ProductStore {
    registry: CategoryRegistry,
    backend: Arc<dyn CatalogBackend>,
}

impl ProductStore {
    pub fn new(registry: CategoryRegistry, backend: Arc<dyn CatalogBackend>) -> Self {
        Self { registry, backend }
    }

    /// Insert a product and return its id.
    pub fn add(&self, category_label: &str, draft: ProductDraft) -> Result<i64, CatalogError> {
        let _span = tracing_helpers::catalog_operation_span("add_product").entered();
        let result = self.add_inner(category_label, draft);
        record_outcome("add_product", &result);
        result
    }

    fn add_inner(&self, category_label: &str, draft: ProductDraft) -> Result<i64, CatalogError> {
        let category = self.registry.resolve(category_label)?;
        let product = draft.validate()?;

        let existing = self
            .backend
            .find_duplicate(&category, &product.name, product.brand.as_deref())
            .map_err(|e| relation_error(&category, e))?;
        if existing.is_some() {
            return Err(duplicate(&category, &product));
        }

        // The unique index still catches a concurrent insert of the same product.
        match self.backend.insert_product(&category, &product) {
            Ok(id) => {
                log::debug!("Added product {} to {}", id, category.name());
                Ok(id)
            }
            Err(StoreError::UniqueViolation(_)) => Err(duplicate(&category, &product)),
            Err(e) => Err(relation_error(&category, e)),
        }
    }

    pub fn get(&self, category_label: &str, id: i64) -> Result<Product, CatalogError> {
        let category = self.registry.resolve(category_label)?;
        self.backend
            .get_product(&category, id)
            .map_err(|e| relation_error(&category, e))?
            .ok_or_else(|| not_found(&category, id))
    }

    /// Overwrite the provided fields of one product.
    pub fn update(
        &self,
        category_label: &str,
        id: i64,
        patch: ProductPatch,
    ) -> Result<(), CatalogError> {
        let _span = tracing_helpers::catalog_operation_span("update_product").entered();
        let result = self.update_inner(category_label, id, patch);
        record_outcome("update_product", &result);
        result
    }

    fn update_inner(
        &self,
        category_label: &str,
        id: i64,
        patch: ProductPatch,
    ) -> Result<(), CatalogError> {
        // Category resolution is the only check possible before touching the relation.
        let category = self.registry.resolve(category_label)?;
        let patch = patch.validate()?;

        match self.backend.update_product(&category, id, &patch) {
            Ok(true) => Ok(()),
            Ok(false) => Err(not_found(&category, id)),
            Err(StoreError::UniqueViolation(_)) => Err(self.update_conflict(&category, id, patch)),
            Err(e) => Err(relation_error(&category, e)),
        }
    }

    /// Describe the conflicting product by its merged name and brand.
    fn update_conflict(
        &self,
        category: &ResolvedCategory,
        id: i64,
        patch: ValidPatch,
    ) -> CatalogError {
        let stored = match self.backend.get_product(category, id) {
            Ok(stored) => stored,
            Err(e) => {
                log::warn!("Could not read product {} after update conflict: {}", id, e);
                None
            }
        };
        let name = patch
            .name
            .or_else(|| stored.as_ref().map(|p| p.name.clone()))
            .unwrap_or_else(|| format!("#{id}"));
        let brand = match patch.brand {
            Some(brand) => brand,
            None => stored.and_then(|p| p.brand),
        };
        CatalogError::DuplicateProduct {
            category: category.name().to_string(),
            name,
            brand,
        }
    }

    /// Delete one product. A missing row is reported as `ProductNotFound`
    /// every time, so repeating a delete is harmless.
    pub fn delete(&self, category_label: &str, id: i64) -> Result<(), CatalogError> {
        let _span = tracing_helpers::catalog_operation_span("delete_product").entered();
        let result = self.delete_inner(category_label, id);
        record_outcome("delete_product", &result);
        result
    }

    fn delete_inner(&self, category_label: &str, id: i64) -> Result<(), CatalogError> {
        let category = self.registry.resolve(category_label)?;
        match self.backend.delete_product(&category, id) {
            Ok(true) => Ok(()),
            Ok(false) => Err(not_found(&category, id)),
            Err(e) => Err(relation_error(&category, e)),
        }
    }
}

fn not_found(category: &ResolvedCategory, id: i64) -> CatalogError {
    CatalogError::ProductNotFound {
        category: category.name().to_string(),
        id,
    }
}

fn duplicate(category: &ResolvedCategory, product: &NewProduct) -> CatalogError {
    CatalogError::DuplicateProduct {
        category: category.name().to_string(),
        name: product.name.clone(),
        brand: product.brand.clone(),
    }
}

/// A registered category whose relation is gone is a registry/relation
/// inconsistency, not a caller mistake.
pub(crate) fn relation_error(category: &ResolvedCategory, err: StoreError) -> CatalogError {
    match err {
        StoreError::MissingRelation(_) => CatalogError::Internal(format!(
            "category '{}' is registered but its relation is missing",
            category.name()
        )),
        other => CatalogError::from_store(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::error::ErrorKind;
    use rust_decimal::Decimal;

    fn setup() -> (ProductStore, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        let registry = CategoryRegistry::new(backend.clone());
        registry.register("soap").unwrap();
        (ProductStore::new(registry, backend.clone()), backend)
    }

    fn draft(name: &str, brand: Option<&str>) -> ProductDraft {
        ProductDraft {
            name: Some(name.into()),
            brand: brand.map(Into::into),
            classification_code: None,
            unit_price: Some(Decimal::new(1250, 2)),
            units_per_case: Some(24),
        }
    }

    #[test]
    fn test_add_and_get() {
        let (store, _) = setup();
        let id = store.add("Soap", draft("Lux", Some("HUL"))).unwrap();
        let product = store.get("soap", id).unwrap();
        assert_eq!(product.name, "Lux");
        assert_eq!(product.brand.as_deref(), Some("HUL"));
        assert_eq!(product.unit_price.to_string(), "12.50");
    }

    #[test]
    fn test_duplicate_is_case_insensitive_and_blank_brand_equal() {
        let (store, backend) = setup();
        store.add("soap", draft("Lux", None)).unwrap();

        let err = store.add("soap", draft("LUX", Some("  "))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(backend.row_count("soap"), 1);

        // Different brand is a different product.
        store.add("soap", draft("Lux", Some("HUL"))).unwrap();
        assert_eq!(backend.row_count("soap"), 2);
    }

    #[test]
    fn test_add_to_unregistered_category_creates_nothing() {
        let (store, backend) = setup();
        let err = store.add("biscuits", draft("Marie", None)).unwrap_err();
        assert_eq!(err, CatalogError::CategoryNotFound("biscuits".into()));
        assert_eq!(backend.total_rows(), 0);
    }

    #[test]
    fn test_add_validates_after_resolving() {
        let (store, _) = setup();
        let mut bad = draft("Lux", None);
        bad.units_per_case = Some(-1);
        assert_eq!(store.add("soap", bad.clone()).unwrap_err().kind(), ErrorKind::InvalidInput);
        assert_eq!(store.add("nope", bad).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_update_distinguishes_missing_category_and_row() {
        let (store, _) = setup();
        let patch = || ProductPatch {
            unit_price: Some(Decimal::new(999, 2)),
            ..Default::default()
        };

        assert!(matches!(
            store.update("biscuits", 1, patch()).unwrap_err(),
            CatalogError::CategoryNotFound(_)
        ));
        assert!(matches!(
            store.update("soap", 42, patch()).unwrap_err(),
            CatalogError::ProductNotFound { id: 42, .. }
        ));
    }

    #[test]
    fn test_update_overwrites_only_provided_fields() {
        let (store, _) = setup();
        let id = store.add("soap", draft("Lux", Some("HUL"))).unwrap();
        store
            .update(
                "soap",
                id,
                ProductPatch {
                    unit_price: Some(Decimal::new(1500, 2)),
                    brand: Some(String::new()),
                    ..Default::default()
                },
            )
            .unwrap();

        let product = store.get("soap", id).unwrap();
        assert_eq!(product.name, "Lux");
        assert_eq!(product.brand, None);
        assert_eq!(product.unit_price.to_string(), "15.00");
        assert_eq!(product.units_per_case, 24);
    }

    #[test]
    fn test_update_rename_into_existing_product_conflicts() {
        let (store, _) = setup();
        store.add("soap", draft("Lux", None)).unwrap();
        let id = store.add("soap", draft("Dove", None)).unwrap();
        let err = store
            .update(
                "soap",
                id,
                ProductPatch {
                    name: Some("lux".into()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_brand_only_conflict_names_the_stored_product() {
        let (store, _) = setup();
        store.add("soap", draft("Lux", Some("HUL"))).unwrap();
        let id = store.add("soap", draft("Lux", None)).unwrap();
        let err = store
            .update(
                "soap",
                id,
                ProductPatch {
                    brand: Some("hul".into()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert_eq!(
            err,
            CatalogError::DuplicateProduct {
                category: "soap".into(),
                name: "Lux".into(),
                brand: Some("hul".into()),
            }
        );
        assert_eq!(err.to_string(), "product 'Lux' (hul) already exists in category 'soap'");
    }

    #[test]
    fn test_delete_missing_is_not_found_and_repeatable() {
        let (store, backend) = setup();
        let keep = store.add("soap", draft("Lux", None)).unwrap();
        let gone = store.add("soap", draft("Dove", None)).unwrap();

        store.delete("soap", gone).unwrap();
        for _ in 0..2 {
            let err = store.delete("soap", gone).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::NotFound);
            assert!(matches!(err, CatalogError::ProductNotFound { .. }));
        }
        assert_eq!(backend.row_count("soap"), 1);
        assert!(store.get("soap", keep).is_ok());
    }
}
