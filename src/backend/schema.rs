//! DDL for the registry and the per-category relations.

use sea_query::{Alias, ColumnDef, Expr, Index, PostgresQueryBuilder, Table};

use crate::catalog::identifier::{
    RelationName, COMPANION_PRIMARY_KEY, COMPANION_SEQUENCE, COMPANION_UNIQUE_INDEX,
};

/// Column names shared by every category relation.
pub const PRODUCT_COLUMNS: &str = "id, productname, brand, hsn_code, price, per_case";

pub fn create_schema_sql(schema: &RelationName) -> String {
    format!("CREATE SCHEMA IF NOT EXISTS {}", schema.quoted())
}

/// `CREATE TABLE IF NOT EXISTS` for the registry relation.
pub fn registry_table_sql(registry: &RelationName) -> String {
    Table::create()
        .table(Alias::new(registry.as_str()))
        .if_not_exists()
        .col(
            ColumnDef::new(Alias::new("name"))
                .string_len(63)
                .not_null()
                .primary_key(),
        )
        .col(ColumnDef::new(Alias::new("label")).text().not_null())
        .col(
            ColumnDef::new(Alias::new("created_at"))
                .timestamp_with_time_zone()
                .not_null()
                .default(Expr::cust("now()")),
        )
        .to_owned()
        .build(PostgresQueryBuilder)
}

/// Statements that provision one category, in execution order.
///
/// Every object is named explicitly from the category name plus a `__`
/// suffix. PostgreSQL's own naming (`<table>_id_seq`, `<table>_pkey`) would
/// produce names that a later category could legally take.
pub fn category_relation_sql(schema: &RelationName, category: &RelationName) -> Vec<String> {
    vec![
        category_sequence_sql(schema, category),
        category_table_sql(schema, category),
        category_sequence_owner_sql(schema, category),
        category_unique_index_sql(schema, category),
    ]
}

pub fn category_sequence_sql(schema: &RelationName, category: &RelationName) -> String {
    format!(
        "CREATE SEQUENCE {}",
        qualified(schema, &category.companion(COMPANION_SEQUENCE))
    )
}

/// `CREATE TABLE` for one category. Fails if the relation already exists.
pub fn category_table_sql(schema: &RelationName, category: &RelationName) -> String {
    let sequence = qualified(schema, &category.companion(COMPANION_SEQUENCE));
    let primary_key = category.companion(COMPANION_PRIMARY_KEY);
    Table::create()
        .table((Alias::new(schema.as_str()), Alias::new(category.as_str())))
        .col(
            ColumnDef::new(Alias::new("id"))
                .big_integer()
                .not_null()
                .default(Expr::cust(format!("nextval('{sequence}'::regclass)"))),
        )
        .col(ColumnDef::new(Alias::new("productname")).text().not_null())
        .col(ColumnDef::new(Alias::new("brand")).text().null())
        .col(ColumnDef::new(Alias::new("hsn_code")).string_len(10).null())
        .col(
            ColumnDef::new(Alias::new("price"))
                .decimal_len(12, 2)
                .not_null(),
        )
        .col(ColumnDef::new(Alias::new("per_case")).integer().not_null())
        .primary_key(
            Index::create()
                .name(primary_key.as_str())
                .col(Alias::new("id")),
        )
        .to_owned()
        .build(PostgresQueryBuilder)
}

/// Tie the id sequence to its column so dropping the relation drops it too.
pub fn category_sequence_owner_sql(schema: &RelationName, category: &RelationName) -> String {
    format!(
        "ALTER SEQUENCE {} OWNED BY {}.\"id\"",
        qualified(schema, &category.companion(COMPANION_SEQUENCE)),
        qualified(schema, category)
    )
}

/// Case-insensitive uniqueness of (name, brand) with a missing brand equal to "".
pub fn category_unique_index_sql(schema: &RelationName, category: &RelationName) -> String {
    format!(
        "CREATE UNIQUE INDEX {} ON {} (lower(productname), lower(coalesce(brand, '')))",
        category.companion(COMPANION_UNIQUE_INDEX).quoted(),
        qualified(schema, category)
    )
}

/// `"schema"."relation"`
pub fn qualified(schema: &RelationName, relation: &RelationName) -> String {
    format!("{}.{}", schema.quoted(), relation.quoted())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> RelationName {
        RelationName::from_config(s).unwrap()
    }

    #[test]
    fn test_category_table_is_schema_qualified_and_quoted() {
        let sql = category_table_sql(&name("catalog"), &name("cold_drinks"));
        assert!(sql.starts_with("CREATE TABLE"), "{sql}");
        assert!(sql.contains("\"catalog\".\"cold_drinks\""), "{sql}");
        assert!(!sql.contains("IF NOT EXISTS"), "{sql}");
        assert!(sql.contains("nextval('\"catalog\".\"cold_drinks__seq\"'::regclass)"), "{sql}");
        assert!(sql.contains("CONSTRAINT \"cold_drinks__pk\" PRIMARY KEY"), "{sql}");
        for column in ["\"productname\"", "\"brand\"", "\"hsn_code\"", "\"price\"", "\"per_case\""] {
            assert!(sql.contains(column), "{column} missing from {sql}");
        }
    }

    #[test]
    fn test_registry_table_is_idempotent() {
        let sql = registry_table_sql(&name("product_categories"));
        assert!(sql.contains("IF NOT EXISTS"), "{sql}");
        assert!(sql.contains("\"product_categories\""), "{sql}");
        assert!(sql.contains("now()"), "{sql}");
    }

    #[test]
    fn test_unique_index_covers_lowered_name_and_brand() {
        let sql = category_unique_index_sql(&name("catalog"), &name("soap"));
        assert_eq!(
            sql,
            "CREATE UNIQUE INDEX \"soap__uq\" ON \"catalog\".\"soap\" (lower(productname), lower(coalesce(brand, '')))"
        );
    }

    #[test]
    fn test_every_companion_object_is_named_after_the_category() {
        let statements = category_relation_sql(&name("catalog"), &name("soap"));
        assert_eq!(statements.len(), 4);
        assert_eq!(statements[0], "CREATE SEQUENCE \"catalog\".\"soap__seq\"");
        assert!(statements[1].starts_with("CREATE TABLE \"catalog\".\"soap\""));
        assert_eq!(
            statements[2],
            "ALTER SEQUENCE \"catalog\".\"soap__seq\" OWNED BY \"catalog\".\"soap\".\"id\""
        );
        assert!(statements[3].starts_with("CREATE UNIQUE INDEX \"soap__uq\""));
        // No statement leaves a name for PostgreSQL to derive.
        assert!(statements.iter().all(|sql| !sql.contains("_pkey") && !sql.contains("_id_seq")));
    }

    #[test]
    fn test_create_schema() {
        assert_eq!(
            create_schema_sql(&name("catalog")),
            "CREATE SCHEMA IF NOT EXISTS \"catalog\""
        );
    }
}
