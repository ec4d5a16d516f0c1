//! Category registry: the authoritative set of category names.
//!
//! Registration inserts the registry row and provisions the category's
//! relation in one backend call, which the PostgreSQL backend runs as a
//! single transaction. The registry's primary key decides concurrent
//! registrations of the same canonical name; there is no read-then-write
//! check in front of it.

use serde::Serialize;
use std::sync::Arc;

use crate::backend::{CatalogBackend, RegisterError};
use crate::catalog::identifier::RelationName;
use crate::catalog::record_outcome;
use crate::error::{CatalogError, StoreError};
use crate::metrics::tracing_helpers;

/// A registered category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Category {
    #[serde(serialize_with = "serialize_relation_name")]
    pub name: RelationName,
    pub label: String,
}

fn serialize_relation_name<S: serde::Serializer>(
    name: &RelationName,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(name.as_str())
}

/// Proof that a label was resolved through the registry.
///
/// Only the registry mints these, and every per-category backend call takes
/// one, so a raw label can never reach a relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCategory {
    name: RelationName,
}

impl ResolvedCategory {
    pub(crate) fn new(name: RelationName) -> Self {
        Self { name }
    }

    pub fn relation(&self) -> &RelationName {
        &self.name
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }
}

#[derive(Clone)]
pub struct CategoryRegistry {
    backend: Arc<dyn CatalogBackend>,
}

impl CategoryRegistry {
    pub fn new(backend: Arc<dyn CatalogBackend>) -> Self {
        Self { backend }
    }

    /// Register a category and provision its relation.
    pub fn register(&self, label: &str) -> Result<Category, CatalogError> {
        let _span = tracing_helpers::catalog_operation_span("register_category").entered();
        let result = self.register_inner(label);
        record_outcome("register_category", &result);
        result
    }

    fn register_inner(&self, label: &str) -> Result<Category, CatalogError> {
        let name = RelationName::parse(label)?;
        let label = label.trim().to_string();

        match self.backend.register_category(&name, &label) {
            Ok(()) => {
                log::info!("Registered category '{}' as relation {}", label, name.quoted());
                Ok(Category { name, label })
            }
            Err(RegisterError::Registry(StoreError::UniqueViolation(_))) => {
                Err(CatalogError::CategoryExists(name.to_string()))
            }
            Err(RegisterError::Registry(err)) => Err(CatalogError::from_store(err)),
            Err(RegisterError::Provision(StoreError::RelationExists(msg))) => {
                // An unregistered relation occupies the name; only an operator can fix that.
                log::error!("Relation for '{}' exists outside the registry: {}", name, msg);
                Err(CatalogError::Provisioning {
                    category: name.to_string(),
                    reason: format!("an unregistered relation named {} already exists", name.quoted()),
                    retryable: false,
                })
            }
            Err(RegisterError::Provision(err)) => {
                log::error!("Provisioning relation for '{}' failed: {}", name, err);
                let retryable = matches!(err, StoreError::Unavailable(_));
                Err(CatalogError::Provisioning {
                    category: name.to_string(),
                    reason: err.to_string(),
                    retryable,
                })
            }
        }
    }

    /// All categories, ordered by canonical name.
    pub fn list(&self) -> Result<Vec<Category>, CatalogError> {
        let mut categories = self
            .backend
            .list_categories()
            .map_err(CatalogError::from_store)?;
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    /// Resolve a caller label to a registered category.
    pub fn resolve(&self, label: &str) -> Result<ResolvedCategory, CatalogError> {
        let name = RelationName::parse(label)?;
        match self
            .backend
            .find_category(&name)
            .map_err(CatalogError::from_store)?
        {
            Some(category) => Ok(ResolvedCategory::new(category.name)),
            None => Err(CatalogError::CategoryNotFound(name.to_string())),
        }
    }
}
