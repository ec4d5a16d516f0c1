//! Storage seam for the catalog.
//!
//! [`CatalogBackend`] is injected into every catalog component. Two
//! implementations ship with the crate:
//!
//! * [`postgres::PgBackend`], one PostgreSQL relation per category over a [`DbPool`](crate::pool::DbPool)
//! * [`memory::MemoryBackend`], an in-process engine with the same constraints, for tests and local runs
//!
//! Implementations must enforce uniqueness themselves (registry names, and
//! the case-insensitive name/brand key within a category) and report
//! conflicts as [`StoreError::UniqueViolation`]; the catalog relies on that
//! rather than on its own pre-checks.

pub mod memory;
pub mod postgres;
pub mod schema;

use std::fmt;

use crate::catalog::identifier::RelationName;
use crate::catalog::product::{NewProduct, Product, ValidPatch};
use crate::catalog::registry::{Category, ResolvedCategory};
use crate::catalog::states::StateCode;
use crate::error::StoreError;

/// Where a category registration failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterError {
    /// Writing the registry row failed (including name conflicts).
    Registry(StoreError),
    /// Creating the category relation failed; the registry row was rolled back.
    Provision(StoreError),
}

impl fmt::Display for RegisterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterError::Registry(e) => write!(f, "registry insert failed: {e}"),
            RegisterError::Provision(e) => write!(f, "relation provisioning failed: {e}"),
        }
    }
}

impl std::error::Error for RegisterError {}

pub trait CatalogBackend: Send + Sync {
    /// Create the registry and the category namespace if they do not exist.
    fn ensure_schema(&self) -> Result<(), StoreError>;

    /// Atomically record the category and provision its relation.
    fn register_category(&self, name: &RelationName, label: &str) -> Result<(), RegisterError>;

    fn list_categories(&self) -> Result<Vec<Category>, StoreError>;

    fn find_category(&self, name: &RelationName) -> Result<Option<Category>, StoreError>;

    /// Id of a product with the same case-insensitive name and brand, if any.
    fn find_duplicate(
        &self,
        category: &ResolvedCategory,
        name: &str,
        brand: Option<&str>,
    ) -> Result<Option<i64>, StoreError>;

    fn insert_product(
        &self,
        category: &ResolvedCategory,
        product: &NewProduct,
    ) -> Result<i64, StoreError>;

    fn get_product(&self, category: &ResolvedCategory, id: i64)
        -> Result<Option<Product>, StoreError>;

    /// Returns `false` when no row has this id.
    fn update_product(
        &self,
        category: &ResolvedCategory,
        id: i64,
        patch: &ValidPatch,
    ) -> Result<bool, StoreError>;

    /// Returns `false` when no row has this id.
    fn delete_product(&self, category: &ResolvedCategory, id: i64) -> Result<bool, StoreError>;

    fn list_products(&self, category: &ResolvedCategory) -> Result<Vec<Product>, StoreError>;

    /// Rows whose lower-cased name or brand contains `needle` (already lower-cased).
    fn search_products(
        &self,
        category: &ResolvedCategory,
        needle: &str,
    ) -> Result<Vec<Product>, StoreError>;

    /// Rows of the state-code lookup table, ordered by code.
    fn list_states(&self) -> Result<Vec<StateCode>, StoreError>;
}
