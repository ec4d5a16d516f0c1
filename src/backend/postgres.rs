//! PostgreSQL backend: one relation per category, registry in its own table.
//!
//! Every statement runs on a connection checked out of the [`DbPool`] for
//! the duration of one backend call. Registration runs inside a
//! [`Transaction`](crate::transaction::Transaction) so the registry row and
//! the relation commit or roll back together; PostgreSQL DDL is
//! transactional, which is what makes that possible.
//!
//! Relation names come only from [`ResolvedCategory`] (or a freshly parsed
//! [`RelationName`] during registration) and reach SQL only through
//! [`RelationName::quoted`]. All values are bound parameters.

use may_postgres::types::ToSql;
use may_postgres::Row;

use crate::backend::schema::{
    category_relation_sql, create_schema_sql, qualified, registry_table_sql, PRODUCT_COLUMNS,
};
use crate::backend::{CatalogBackend, RegisterError};
use crate::catalog::identifier::RelationName;
use crate::catalog::product::{NewProduct, Product, ValidPatch};
use crate::catalog::registry::{Category, ResolvedCategory};
use crate::catalog::states::StateCode;
use crate::error::StoreError;
use crate::executor::{DbError, SqlExecutor};
use crate::pool::{DbPool, PooledConnection};

pub struct PgBackend {
    pool: DbPool,
    schema: RelationName,
    registry_table: RelationName,
    states_table: RelationName,
}

impl PgBackend {
    pub fn new(
        pool: DbPool,
        schema: RelationName,
        registry_table: RelationName,
        states_table: RelationName,
    ) -> Self {
        Self {
            pool,
            schema,
            registry_table,
            states_table,
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Release pooled connections. Called once at shutdown.
    pub fn close(&self) {
        self.pool.close();
    }

    fn table(&self, category: &ResolvedCategory) -> String {
        qualified(&self.schema, category.relation())
    }

    /// Check out a connection and run `f` on it.
    ///
    /// A connection whose failure looks like a lost server is discarded
    /// rather than returned to the pool.
    fn with_conn<T>(
        &self,
        f: impl FnOnce(&PooledConnection<'_>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut conn = self.pool.acquire().map_err(StoreError::from)?;
        let result = f(&conn);
        if let Err(StoreError::Unavailable(msg)) = &result {
            log::warn!("Dropping pooled connection after failure: {}", msg);
            conn.mark_broken();
        }
        result
    }
}

fn product_from_row(row: &Row) -> Result<Product, StoreError> {
    let parse = |e: may_postgres::Error| StoreError::from(DbError::ParseError(e.to_string()));
    Ok(Product {
        id: row.try_get("id").map_err(parse)?,
        name: row.try_get("productname").map_err(parse)?,
        brand: row.try_get("brand").map_err(parse)?,
        classification_code: row.try_get("hsn_code").map_err(parse)?,
        unit_price: row.try_get("price").map_err(parse)?,
        units_per_case: row.try_get("per_case").map_err(parse)?,
    })
}

fn category_from_row(row: &Row) -> Result<Category, StoreError> {
    let name: String = row
        .try_get("name")
        .map_err(|e| StoreError::from(DbError::ParseError(e.to_string())))?;
    let label: String = row
        .try_get("label")
        .map_err(|e| StoreError::from(DbError::ParseError(e.to_string())))?;
    let name = RelationName::from_stored(&name).map_err(|e| StoreError::Other(e.to_string()))?;
    Ok(Category { name, label })
}

fn products_from_rows(rows: &[Row]) -> Result<Vec<Product>, StoreError> {
    rows.iter().map(product_from_row).collect()
}

impl CatalogBackend for PgBackend {
    fn ensure_schema(&self) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(&create_schema_sql(&self.schema), &[])?;
            conn.execute(&registry_table_sql(&self.registry_table), &[])?;
            log::info!(
                "Catalog schema {} and registry {} ready",
                self.schema.quoted(),
                self.registry_table.quoted()
            );
            Ok(())
        })
    }

    fn register_category(&self, name: &RelationName, label: &str) -> Result<(), RegisterError> {
        let mut conn = self.pool.acquire().map_err(|e| RegisterError::Registry(e.into()))?;

        let result = (|| {
            let tx = conn
                .begin()
                .map_err(|e| RegisterError::Registry(DbError::from(e).into()))?;

            let insert = format!(
                "INSERT INTO {} (name, label) VALUES ($1, $2)",
                self.registry_table.quoted()
            );
            tx.execute(&insert, &[&name.as_str(), &label])
                .map_err(|e| RegisterError::Registry(e.into()))?;

            for statement in category_relation_sql(&self.schema, name) {
                tx.execute(&statement, &[])
                    .map_err(|e| RegisterError::Provision(e.into()))?;
            }

            tx.commit()
                .map_err(|e| RegisterError::Provision(DbError::from(e).into()))
        })();

        if let Err(RegisterError::Registry(StoreError::Unavailable(_)))
        | Err(RegisterError::Provision(StoreError::Unavailable(_))) = &result
        {
            conn.mark_broken();
        }
        result
    }

    fn list_categories(&self) -> Result<Vec<Category>, StoreError> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT name, label FROM {} ORDER BY name",
                self.registry_table.quoted()
            );
            let rows = conn.query_all(&sql, &[])?;
            rows.iter().map(category_from_row).collect()
        })
    }

    fn find_category(&self, name: &RelationName) -> Result<Option<Category>, StoreError> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT name, label FROM {} WHERE name = $1",
                self.registry_table.quoted()
            );
            let rows = conn.query_all(&sql, &[&name.as_str()])?;
            rows.first().map(category_from_row).transpose()
        })
    }

    fn find_duplicate(
        &self,
        category: &ResolvedCategory,
        name: &str,
        brand: Option<&str>,
    ) -> Result<Option<i64>, StoreError> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT id FROM {} WHERE lower(productname) = lower($1::text) \
                 AND lower(coalesce(brand, '')) = lower(coalesce($2::text, '')) LIMIT 1",
                self.table(category)
            );
            let rows = conn.query_all(&sql, &[&name, &brand])?;
            rows.first()
                .map(|row| {
                    row.try_get::<_, i64>("id")
                        .map_err(|e| StoreError::from(DbError::ParseError(e.to_string())))
                })
                .transpose()
        })
    }

    fn insert_product(
        &self,
        category: &ResolvedCategory,
        product: &NewProduct,
    ) -> Result<i64, StoreError> {
        self.with_conn(|conn| {
            let sql = format!(
                "INSERT INTO {} (productname, brand, hsn_code, price, per_case) \
                 VALUES ($1, $2, $3, $4, $5) RETURNING id",
                self.table(category)
            );
            let row = conn.query_one(
                &sql,
                &[
                    &product.name,
                    &product.brand,
                    &product.classification_code,
                    &product.unit_price,
                    &product.units_per_case,
                ],
            )?;
            row.try_get::<_, i64>("id")
                .map_err(|e| StoreError::from(DbError::ParseError(e.to_string())))
        })
    }

    fn get_product(
        &self,
        category: &ResolvedCategory,
        id: i64,
    ) -> Result<Option<Product>, StoreError> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {PRODUCT_COLUMNS} FROM {} WHERE id = $1",
                self.table(category)
            );
            let rows = conn.query_all(&sql, &[&id])?;
            rows.first().map(product_from_row).transpose()
        })
    }

    fn update_product(
        &self,
        category: &ResolvedCategory,
        id: i64,
        patch: &ValidPatch,
    ) -> Result<bool, StoreError> {
        let mut assignments: Vec<&str> = Vec::new();
        let mut params: Vec<&dyn ToSql> = Vec::new();
        if let Some(name) = &patch.name {
            assignments.push("productname");
            params.push(name);
        }
        if let Some(brand) = &patch.brand {
            assignments.push("brand");
            params.push(brand);
        }
        if let Some(code) = &patch.classification_code {
            assignments.push("hsn_code");
            params.push(code);
        }
        if let Some(price) = &patch.unit_price {
            assignments.push("price");
            params.push(price);
        }
        if let Some(units) = &patch.units_per_case {
            assignments.push("per_case");
            params.push(units);
        }
        if assignments.is_empty() {
            return Err(StoreError::Other("update with no assignments".to_string()));
        }

        let set = assignments
            .iter()
            .enumerate()
            .map(|(i, column)| format!("{column} = ${}", i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {set} WHERE id = ${}",
            self.table(category),
            assignments.len() + 1
        );
        params.push(&id);

        self.with_conn(|conn| Ok(conn.execute(&sql, &params)? > 0))
    }

    fn delete_product(&self, category: &ResolvedCategory, id: i64) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            let sql = format!("DELETE FROM {} WHERE id = $1", self.table(category));
            Ok(conn.execute(&sql, &[&id])? > 0)
        })
    }

    fn list_products(&self, category: &ResolvedCategory) -> Result<Vec<Product>, StoreError> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {PRODUCT_COLUMNS} FROM {} ORDER BY lower(productname), id",
                self.table(category)
            );
            products_from_rows(&conn.query_all(&sql, &[])?)
        })
    }

    fn search_products(
        &self,
        category: &ResolvedCategory,
        needle: &str,
    ) -> Result<Vec<Product>, StoreError> {
        self.with_conn(|conn| {
            // strpos matches literally; LIKE would treat % and _ as wildcards.
            let sql = format!(
                "SELECT {PRODUCT_COLUMNS} FROM {} \
                 WHERE strpos(lower(productname), $1) > 0 \
                    OR strpos(lower(coalesce(brand, '')), $1) > 0 \
                 ORDER BY lower(productname), id",
                self.table(category)
            );
            products_from_rows(&conn.query_all(&sql, &[&needle])?)
        })
    }

    fn list_states(&self) -> Result<Vec<StateCode>, StoreError> {
        self.with_conn(|conn| {
            // The code column's type is the lookup table's business; compare natively, read as text.
            let sql = format!(
                "SELECT code::text AS code, state_name FROM {} ORDER BY code",
                self.states_table.quoted()
            );
            let parse = |e: may_postgres::Error| StoreError::from(DbError::ParseError(e.to_string()));
            conn.query_all(&sql, &[])?
                .iter()
                .map(|row| {
                    Ok(StateCode {
                        code: row.try_get("code").map_err(parse)?,
                        name: row.try_get("state_name").map_err(parse)?,
                    })
                })
                .collect()
        })
    }
}
