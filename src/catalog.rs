//! The dynamic category-table catalog.
//!
//! Three components share one injected [`CatalogBackend`]:
//!
//! * [`CategoryRegistry`] owns which categories exist and provisions their relations.
//! * [`ProductStore`] does CRUD inside one category, always resolving through the registry.
//! * [`CatalogQuery`] lists and searches across every registered category.
//!
//! [`Catalog`] bundles them behind one cloneable handle.

pub mod fanout;
pub mod identifier;
pub mod product;
pub mod registry;
pub mod states;
pub mod store;

use std::sync::Arc;

use crate::backend::CatalogBackend;
use crate::error::CatalogError;

pub use fanout::CatalogQuery;
pub use identifier::RelationName;
pub use product::{Product, ProductDraft, ProductPatch, TaggedProduct};
pub use registry::{Category, CategoryRegistry, ResolvedCategory};
pub use states::StateCode;
pub use store::ProductStore;

#[derive(Clone)]
pub struct Catalog {
    backend: Arc<dyn CatalogBackend>,
    registry: CategoryRegistry,
    products: ProductStore,
    query: CatalogQuery,
}

impl Catalog {
    pub fn new(backend: Arc<dyn CatalogBackend>) -> Self {
        let registry = CategoryRegistry::new(backend.clone());
        Self {
            products: ProductStore::new(registry.clone(), backend.clone()),
            query: CatalogQuery::new(registry.clone(), backend.clone()),
            registry,
            backend,
        }
    }

    /// Create the registry relation and the category schema if missing.
    pub fn bootstrap(&self) -> Result<(), CatalogError> {
        self.backend.ensure_schema().map_err(CatalogError::from_store)
    }

    pub fn register_category(&self, label: &str) -> Result<Category, CatalogError> {
        self.registry.register(label)
    }

    pub fn list_categories(&self) -> Result<Vec<Category>, CatalogError> {
        self.registry.list()
    }

    pub fn resolve(&self, label: &str) -> Result<ResolvedCategory, CatalogError> {
        self.registry.resolve(label)
    }

    pub fn add_product(&self, category: &str, draft: ProductDraft) -> Result<i64, CatalogError> {
        self.products.add(category, draft)
    }

    pub fn get_product(&self, category: &str, id: i64) -> Result<Product, CatalogError> {
        self.products.get(category, id)
    }

    pub fn update_product(
        &self,
        category: &str,
        id: i64,
        patch: ProductPatch,
    ) -> Result<(), CatalogError> {
        self.products.update(category, id, patch)
    }

    pub fn delete_product(&self, category: &str, id: i64) -> Result<(), CatalogError> {
        self.products.delete(category, id)
    }

    pub fn list_all_products(&self) -> Result<Vec<TaggedProduct>, CatalogError> {
        self.query.list_all()
    }

    pub fn search_products(&self, term: &str) -> Result<Vec<TaggedProduct>, CatalogError> {
        self.query.search(term)
    }

    /// State codes, ordered by code.
    pub fn list_states(&self) -> Result<Vec<StateCode>, CatalogError> {
        self.backend.list_states().map_err(CatalogError::from_store)
    }
}

#[cfg(feature = "metrics")]
pub(crate) fn record_outcome<T>(operation: &str, result: &Result<T, CatalogError>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.kind().as_str(),
    };
    crate::metrics::METRICS.record_operation(operation, outcome);
}

#[cfg(not(feature = "metrics"))]
pub(crate) fn record_outcome<T>(_operation: &str, _result: &Result<T, CatalogError>) {}
