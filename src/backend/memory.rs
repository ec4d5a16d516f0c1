//! In-process catalog backend.
//!
//! Holds the registry and every category relation behind one mutex. The
//! lock is held only for the duration of a single backend call, which gives
//! the same guarantees the PostgreSQL backend gets from its constraints:
//! a registry name is inserted at most once, and a name/brand pair at most
//! once per category.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::backend::{CatalogBackend, RegisterError};
use crate::catalog::identifier::RelationName;
use crate::catalog::product::{duplicate_key, NewProduct, Product, ValidPatch};
use crate::catalog::registry::{Category, ResolvedCategory};
use crate::catalog::states::StateCode;
use crate::error::StoreError;

#[derive(Default)]
struct Relation {
    next_id: i64,
    rows: BTreeMap<i64, Product>,
}

impl Relation {
    fn keys_except(&self, id: i64) -> HashSet<(String, String)> {
        self.rows
            .values()
            .filter(|p| p.id != id)
            .map(|p| duplicate_key(&p.name, p.brand.as_deref()))
            .collect()
    }
}

#[derive(Default)]
struct State {
    categories: BTreeMap<RelationName, String>,
    relations: HashMap<RelationName, Relation>,
    relations_created: usize,
    states: Vec<StateCode>,
}

#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
    fail_next_provision: AtomicBool,
    unavailable: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next relation provisioning fail after the registry insert.
    pub fn fail_next_provision(&self) {
        self.fail_next_provision.store(true, Ordering::SeqCst);
    }

    /// Make every call fail as if the storage engine were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of relations that currently exist.
    pub fn relation_count(&self) -> usize {
        self.state.lock().map(|s| s.relations.len()).unwrap_or(0)
    }

    /// Number of relations ever created, including dropped ones.
    pub fn relations_created(&self) -> usize {
        self.state.lock().map(|s| s.relations_created).unwrap_or(0)
    }

    pub fn row_count(&self, relation: &str) -> usize {
        self.state
            .lock()
            .ok()
            .and_then(|s| {
                s.relations
                    .iter()
                    .find(|(name, _)| name.as_str() == relation)
                    .map(|(_, r)| r.rows.len())
            })
            .unwrap_or(0)
    }

    pub fn total_rows(&self) -> usize {
        self.state
            .lock()
            .map(|s| s.relations.values().map(|r| r.rows.len()).sum())
            .unwrap_or(0)
    }

    /// Remove a relation while keeping its registry row, to simulate drift.
    pub fn drop_relation(&self, relation: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.relations.retain(|name, _| name.as_str() != relation);
        }
    }

    /// Replace the state-code table.
    pub fn set_states(&self, states: Vec<StateCode>) {
        if let Ok(mut state) = self.state.lock() {
            state.states = states;
        }
    }

    /// Remove a registry row while keeping its relation.
    pub fn forget_category(&self, category: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.categories.retain(|name, _| name.as_str() != category);
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory backend marked unavailable".to_string()));
        }
        self.state
            .lock()
            .map_err(|_| StoreError::Other("memory backend state poisoned".to_string()))
    }

    fn with_relation<T>(
        &self,
        category: &ResolvedCategory,
        f: impl FnOnce(&mut Relation) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut state = self.lock()?;
        let relation = state.relations.get_mut(category.relation()).ok_or_else(|| {
            StoreError::MissingRelation(format!("relation \"{}\" does not exist", category.name()))
        })?;
        f(relation)
    }
}

impl CatalogBackend for MemoryBackend {
    fn ensure_schema(&self) -> Result<(), StoreError> {
        self.lock().map(|_| ())
    }

    fn register_category(&self, name: &RelationName, label: &str) -> Result<(), RegisterError> {
        let mut state = self.lock().map_err(RegisterError::Registry)?;
        if state.categories.contains_key(name) {
            return Err(RegisterError::Registry(StoreError::UniqueViolation(format!(
                "category \"{name}\" already registered"
            ))));
        }
        if self.fail_next_provision.swap(false, Ordering::SeqCst) {
            // Nothing was written yet, so the "rollback" is simply not inserting.
            return Err(RegisterError::Provision(StoreError::Other(
                "injected provisioning failure".to_string(),
            )));
        }
        if state.relations.contains_key(name) {
            return Err(RegisterError::Provision(StoreError::RelationExists(format!(
                "relation \"{name}\" already exists"
            ))));
        }
        state.categories.insert(name.clone(), label.to_string());
        state.relations.insert(
            name.clone(),
            Relation {
                next_id: 1,
                rows: BTreeMap::new(),
            },
        );
        state.relations_created += 1;
        Ok(())
    }

    fn list_categories(&self) -> Result<Vec<Category>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .categories
            .iter()
            .map(|(name, label)| Category {
                name: name.clone(),
                label: label.clone(),
            })
            .collect())
    }

    fn find_category(&self, name: &RelationName) -> Result<Option<Category>, StoreError> {
        let state = self.lock()?;
        Ok(state.categories.get(name).map(|label| Category {
            name: name.clone(),
            label: label.clone(),
        }))
    }

    fn find_duplicate(
        &self,
        category: &ResolvedCategory,
        name: &str,
        brand: Option<&str>,
    ) -> Result<Option<i64>, StoreError> {
        let key = duplicate_key(name, brand);
        self.with_relation(category, |relation| {
            Ok(relation
                .rows
                .values()
                .find(|p| duplicate_key(&p.name, p.brand.as_deref()) == key)
                .map(|p| p.id))
        })
    }

    fn insert_product(
        &self,
        category: &ResolvedCategory,
        product: &NewProduct,
    ) -> Result<i64, StoreError> {
        self.with_relation(category, |relation| {
            let key = duplicate_key(&product.name, product.brand.as_deref());
            if relation.keys_except(0).contains(&key) {
                return Err(StoreError::UniqueViolation(format!(
                    "duplicate key value violates unique constraint on \"{}\" (productname, brand)",
                    category.name()
                )));
            }
            let id = relation.next_id;
            relation.next_id += 1;
            relation.rows.insert(
                id,
                Product {
                    id,
                    name: product.name.clone(),
                    brand: product.brand.clone(),
                    classification_code: product.classification_code.clone(),
                    unit_price: product.unit_price,
                    units_per_case: product.units_per_case,
                },
            );
            Ok(id)
        })
    }

    fn get_product(
        &self,
        category: &ResolvedCategory,
        id: i64,
    ) -> Result<Option<Product>, StoreError> {
        self.with_relation(category, |relation| Ok(relation.rows.get(&id).cloned()))
    }

    fn update_product(
        &self,
        category: &ResolvedCategory,
        id: i64,
        patch: &ValidPatch,
    ) -> Result<bool, StoreError> {
        self.with_relation(category, |relation| {
            let Some(current) = relation.rows.get(&id) else {
                return Ok(false);
            };
            let mut updated = current.clone();
            patch.apply_to(&mut updated);
            let key = duplicate_key(&updated.name, updated.brand.as_deref());
            if relation.keys_except(id).contains(&key) {
                return Err(StoreError::UniqueViolation(format!(
                    "duplicate key value violates unique constraint on \"{}\" (productname, brand)",
                    category.name()
                )));
            }
            relation.rows.insert(id, updated);
            Ok(true)
        })
    }

    fn delete_product(&self, category: &ResolvedCategory, id: i64) -> Result<bool, StoreError> {
        self.with_relation(category, |relation| Ok(relation.rows.remove(&id).is_some()))
    }

    fn list_products(&self, category: &ResolvedCategory) -> Result<Vec<Product>, StoreError> {
        self.with_relation(category, |relation| {
            Ok(relation.rows.values().cloned().collect())
        })
    }

    fn search_products(
        &self,
        category: &ResolvedCategory,
        needle: &str,
    ) -> Result<Vec<Product>, StoreError> {
        self.with_relation(category, |relation| {
            Ok(relation
                .rows
                .values()
                .filter(|p| {
                    p.name.to_lowercase().contains(needle)
                        || p
                            .brand
                            .as_deref()
                            .is_some_and(|b| b.to_lowercase().contains(needle))
                })
                .cloned()
                .collect())
        })
    }

    fn list_states(&self) -> Result<Vec<StateCode>, StoreError> {
        let state = self.lock()?;
        let mut states = state.states.clone();
        states.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(states)
    }
}
