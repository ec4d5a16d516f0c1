//! Catalog behaviour against a real PostgreSQL server.
//!
//! Set `TEST_DATABASE_URL` to run these; without it every test returns early.
//! Each test works in its own schema and registry table and drops both at the end.

use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rust_decimal::Decimal;
use stockroom::backend::postgres::PgBackend;
use stockroom::catalog::{Catalog, ProductDraft, ProductPatch, RelationName};
use stockroom::config::DatabaseConfig;
use stockroom::executor::SqlExecutor;
use stockroom::pool::DbPool;
use stockroom::{CatalogError, ErrorKind};

static NEXT: AtomicUsize = AtomicUsize::new(0);

struct TestCatalog {
    catalog: Catalog,
    backend: Arc<PgBackend>,
    schema: RelationName,
    registry: RelationName,
    states: RelationName,
}

impl TestCatalog {
    fn connect() -> Option<Self> {
        let url = match std::env::var("TEST_DATABASE_URL") {
            Ok(url) => url,
            Err(_) => {
                eprintln!("TEST_DATABASE_URL not set; skipping");
                return None;
            }
        };
        let n = NEXT.fetch_add(1, Ordering::SeqCst);
        let suffix = format!("{}_{}", std::process::id(), n);
        let schema = RelationName::from_config(&format!("stockroom_it_{suffix}")).unwrap();
        let registry = RelationName::from_config(&format!("categories_it_{suffix}")).unwrap();
        let states = RelationName::from_config(&format!("codestate_it_{suffix}")).unwrap();

        let pool = DbPool::connect(&DatabaseConfig {
            url,
            max_connections: 8,
            pool_timeout_seconds: 30,
            ..DatabaseConfig::default()
        })
        .expect("connect to TEST_DATABASE_URL");
        let backend = Arc::new(PgBackend::new(
            pool,
            schema.clone(),
            registry.clone(),
            states.clone(),
        ));
        let catalog = Catalog::new(backend.clone());
        catalog.bootstrap().expect("bootstrap schema");
        Some(Self {
            catalog,
            backend,
            schema,
            registry,
            states,
        })
    }

    fn count(&self, sql: &str) -> i64 {
        let conn = self.backend.pool().acquire().unwrap();
        conn.query_one(sql, &[]).unwrap().get(0)
    }

    fn table_count(&self) -> i64 {
        self.count(&format!(
            "SELECT count(*) FROM information_schema.tables WHERE table_schema = '{}'",
            self.schema
        ))
    }
}

impl Drop for TestCatalog {
    fn drop(&mut self) {
        if let Ok(conn) = self.backend.pool().acquire() {
            let _ = conn.execute(
                &format!("DROP SCHEMA IF EXISTS {} CASCADE", self.schema.quoted()),
                &[],
            );
            let _ = conn.execute(
                &format!("DROP TABLE IF EXISTS {}", self.registry.quoted()),
                &[],
            );
            let _ = conn.execute(
                &format!("DROP TABLE IF EXISTS {}", self.states.quoted()),
                &[],
            );
        }
        self.backend.close();
    }
}

fn product(name: &str, brand: Option<&str>, price: &str) -> ProductDraft {
    ProductDraft {
        name: Some(name.to_string()),
        brand: brand.map(str::to_string),
        classification_code: None,
        unit_price: Some(Decimal::from_str(price).unwrap()),
        units_per_case: Some(12),
    }
}

#[test]
fn test_registration_provisions_relation() {
    let Some(t) = TestCatalog::connect() else { return };

    t.catalog.register_category("Cold Drinks").unwrap();
    let err = t.catalog.register_category("cold drinks ").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);

    assert_eq!(t.table_count(), 1);
}

#[test]
fn test_names_postgres_would_pick_for_implicit_objects_are_registrable() {
    let Some(t) = TestCatalog::connect() else { return };
    t.catalog.register_category("soap").unwrap();
    t.catalog.add_product("soap", product("Lux", None, "10")).unwrap();

    for label in ["soap id seq", "soap pkey", "soap lower lower1 idx"] {
        let category = t
            .catalog
            .register_category(label)
            .unwrap_or_else(|e| panic!("{label}: {e}"));
        t.catalog
            .add_product(category.name.as_str(), product("Lux", None, "10"))
            .unwrap();
    }
    assert_eq!(t.table_count(), 4);

    let err = t.catalog.register_category("soap__seq").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(t.table_count(), 4);
}

#[test]
fn test_product_lifecycle_and_numeric_precision() {
    let Some(t) = TestCatalog::connect() else { return };
    t.catalog.register_category("soap").unwrap();

    let id = t
        .catalog
        .add_product("soap", product("Lux", Some("HUL"), "19.995"))
        .unwrap();
    let stored = t.catalog.get_product("soap", id).unwrap();
    assert_eq!(stored.unit_price.to_string(), "20.00");

    let err = t
        .catalog
        .add_product("soap", product("LUX", Some("hul"), "1"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);

    t.catalog
        .update_product(
            "soap",
            id,
            ProductPatch {
                brand: Some(String::new()),
                units_per_case: Some(6),
                ..Default::default()
            },
        )
        .unwrap();
    let stored = t.catalog.get_product("soap", id).unwrap();
    assert_eq!(stored.brand, None);
    assert_eq!(stored.units_per_case, 6);

    t.catalog.delete_product("soap", id).unwrap();
    assert!(matches!(
        t.catalog.delete_product("soap", id).unwrap_err(),
        CatalogError::ProductNotFound { .. }
    ));
}

#[test]
fn test_fan_out_order_and_literal_search() {
    let Some(t) = TestCatalog::connect() else { return };
    t.catalog.register_category("soap").unwrap();
    t.catalog.register_category("biscuits").unwrap();
    t.catalog.add_product("soap", product("Lux", None, "10")).unwrap();
    t.catalog.add_product("biscuits", product("Marie", None, "5")).unwrap();
    t.catalog.add_product("biscuits", product("100% Bran", None, "7")).unwrap();

    let rows = t.catalog.list_all_products().unwrap();
    let tagged: Vec<_> = rows
        .iter()
        .map(|r| (r.category.as_str(), r.product.name.as_str()))
        .collect();
    assert_eq!(
        tagged,
        [("biscuits", "100% Bran"), ("biscuits", "Marie"), ("soap", "Lux")]
    );

    assert_eq!(t.catalog.search_products("%").unwrap().len(), 1);
    assert!(t.catalog.search_products("_").unwrap().is_empty());
}

#[test]
fn test_states_come_back_in_code_order() {
    let Some(t) = TestCatalog::connect() else { return };
    {
        let conn = t.backend.pool().acquire().unwrap();
        conn.execute(
            &format!(
                "CREATE TABLE {} (code integer PRIMARY KEY, state_name text NOT NULL)",
                t.states.quoted()
            ),
            &[],
        )
        .unwrap();
        conn.execute(
            &format!(
                "INSERT INTO {} VALUES (33, 'Tamil Nadu'), (9, 'Uttar Pradesh'), (29, 'Karnataka')",
                t.states.quoted()
            ),
            &[],
        )
        .unwrap();
    }

    let states = t.catalog.list_states().unwrap();
    let codes: Vec<_> = states.iter().map(|s| s.code.as_str()).collect();
    assert_eq!(codes, ["9", "29", "33"]);
    assert_eq!(states[1].name, "Karnataka");
}

#[test]
fn test_concurrent_registration_against_postgres() {
    let Some(t) = TestCatalog::connect() else { return };
    let variants = ["Soap", "soap ", " SOAP"];

    let handles: Vec<_> = (0..100)
        .map(|i| {
            let catalog = t.catalog.clone();
            let label = variants[i % variants.len()];
            may::go!(move || catalog.register_category(label).map(|_| ()))
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let wins = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(e) if e.kind() == ErrorKind::AlreadyExists))
        .count();
    assert_eq!(wins, 1, "{results:?}");
    assert_eq!(conflicts, 99, "{results:?}");

    let registered = t.count(&format!("SELECT count(*) FROM {}", t.registry.quoted()));
    assert_eq!(registered, 1);
    assert_eq!(t.table_count(), 1);
}
