//! Category label normalization and the relation identifier grammar.
//!
//! A [`RelationName`] is the only way a category name reaches SQL. It can be
//! built from caller text ([`RelationName::parse`]) or from a registry row
//! ([`RelationName::from_stored`]); both paths enforce the same grammar:
//!
//! * `^[a-z_][a-z0-9_]*$`
//! * at most 63 bytes (`NAMEDATALEN - 1`)
//!
//! Category names are narrower still: no `__` anywhere and at most
//! [`MAX_CATEGORY_NAME_LEN`] bytes. The sequence, primary key and unique
//! index of a category relation are named `<name>__seq`, `<name>__pk` and
//! `<name>__uq`, so no category name can equal another category's
//! companion object, and every companion name fits in 63 bytes.
//!
//! Labels are lower-cased, trimmed, and internal whitespace runs become a
//! single `_`. Nothing else is rewritten: a label with any other character
//! is rejected rather than silently stripped.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

use crate::error::CatalogError;

/// Longest identifier PostgreSQL keeps without truncating.
pub const MAX_RELATION_NAME_LEN: usize = 63;

/// Room left for the longest companion suffix (`__seq`).
pub const MAX_CATEGORY_NAME_LEN: usize = MAX_RELATION_NAME_LEN - COMPANION_SEQUENCE.len();

/// Suffixes of the objects created alongside a category relation.
pub const COMPANION_SEQUENCE: &str = "__seq";
pub const COMPANION_PRIMARY_KEY: &str = "__pk";
pub const COMPANION_UNIQUE_INDEX: &str = "__uq";

static RELATION_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z_][a-z0-9_]*$").expect("relation name grammar compiles"));

/// Canonical, identifier-safe category name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationName(String);

/// Lower-case, trim, collapse whitespace runs into `_`.
pub fn normalize_label(label: &str) -> String {
    label
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}

impl RelationName {
    /// Normalize a caller-supplied label and validate the result.
    pub fn parse(label: &str) -> Result<Self, CatalogError> {
        let normalized = normalize_label(label);
        if normalized.is_empty() {
            return Err(CatalogError::invalid("category name is required"));
        }
        Self::validate_category(&normalized).map_err(|reason| {
            CatalogError::invalid(format!(
                "category '{}' normalizes to '{}', which {}",
                label.trim(),
                normalized,
                reason
            ))
        })?;
        Ok(Self(normalized))
    }

    /// Re-check a name read back from the registry.
    ///
    /// Rows are only written through [`RelationName::parse`], but the registry
    /// table is reachable by other tools, so a row is not trusted blindly.
    pub fn from_stored(name: &str) -> Result<Self, CatalogError> {
        Self::validate_category(name).map_err(|reason| {
            CatalogError::Internal(format!("registry row '{name}' {reason}"))
        })?;
        Ok(Self(name.to_string()))
    }

    /// Accept an identifier from configuration verbatim (schema, registry table).
    pub fn from_config(name: &str) -> Result<Self, String> {
        Self::validate(name).map_err(|reason| format!("identifier '{name}' {reason}"))?;
        Ok(Self(name.to_string()))
    }

    fn validate(name: &str) -> Result<(), String> {
        if name.len() > MAX_RELATION_NAME_LEN {
            return Err(format!(
                "is longer than {MAX_RELATION_NAME_LEN} bytes ({} bytes)",
                name.len()
            ));
        }
        if !RELATION_NAME.is_match(name) {
            return Err(
                "may only contain a-z, 0-9 and '_' and must not start with a digit".to_string(),
            );
        }
        Ok(())
    }

    fn validate_category(name: &str) -> Result<(), String> {
        if name.len() > MAX_CATEGORY_NAME_LEN {
            return Err(format!(
                "is longer than {MAX_CATEGORY_NAME_LEN} bytes ({} bytes)",
                name.len()
            ));
        }
        if name.contains("__") {
            return Err("must not contain '__'".to_string());
        }
        Self::validate(name)
    }

    /// Name of an object that belongs to this category relation.
    ///
    /// Only meaningful for category names, whose length cap leaves room for
    /// the suffix.
    pub(crate) fn companion(&self, suffix: &str) -> RelationName {
        RelationName(format!("{}{}", self.0, suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Double-quoted identifier, safe to splice into SQL.
    ///
    /// The grammar excludes `"`, so no escaping is needed.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl fmt::Display for RelationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_normalize_label() {
        assert_eq!(normalize_label("Soap"), "soap");
        assert_eq!(normalize_label("  Cold   Drinks \t"), "cold_drinks");
        assert_eq!(normalize_label(" SOAP"), "soap");
        assert_eq!(normalize_label("soap "), "soap");
        assert_eq!(normalize_label("   "), "");
    }

    #[test]
    fn test_variants_share_a_canonical_name() {
        let a = RelationName::parse("Soap").unwrap();
        let b = RelationName::parse("soap ").unwrap();
        let c = RelationName::parse(" SOAP").unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(a.as_str(), "soap");
    }

    #[test]
    fn test_parse_rejects_empty() {
        let err = RelationName::parse("  ").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_parse_rejects_injection_attempts() {
        for label in [
            "soap; DROP TABLE product_categories",
            "soap\"",
            "soap--",
            "cola-500ml",
            "1soap",
            "pâte",
            "a.b",
        ] {
            let err = RelationName::parse(label).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidInput, "{label}");
        }
    }

    #[test]
    fn test_parse_reports_effective_name() {
        let err = RelationName::parse("Cola-500ml").unwrap_err();
        assert!(err.to_string().contains("'cola-500ml'"));
    }

    #[test]
    fn test_length_limit() {
        let ok = "a".repeat(MAX_CATEGORY_NAME_LEN);
        assert!(RelationName::parse(&ok).is_ok());
        let too_long = "a".repeat(MAX_CATEGORY_NAME_LEN + 1);
        assert_eq!(
            RelationName::parse(&too_long).unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
        // Configured identifiers only carry the PostgreSQL limit.
        assert!(RelationName::from_config(&"a".repeat(MAX_RELATION_NAME_LEN)).is_ok());
    }

    #[test]
    fn test_double_underscore_is_reserved_for_companions() {
        for label in ["soap__seq", "soap__pk", "__soap", "a___b"] {
            let err = RelationName::parse(label).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidInput, "{label}");
            assert!(err.to_string().contains(&format!("'{label}'")), "{err}");
        }
        // Names PostgreSQL would pick for implicit objects are ordinary categories.
        for label in ["soap id seq", "soap pkey", "soap_lower_lower1_idx", "_soap"] {
            assert!(RelationName::parse(label).is_ok(), "{label}");
        }
    }

    #[test]
    fn test_companion_names_fit_the_identifier_limit() {
        let longest = RelationName::parse(&"z".repeat(MAX_CATEGORY_NAME_LEN)).unwrap();
        for suffix in [COMPANION_SEQUENCE, COMPANION_PRIMARY_KEY, COMPANION_UNIQUE_INDEX] {
            let name = longest.companion(suffix);
            assert!(name.as_str().len() <= MAX_RELATION_NAME_LEN, "{name}");
            assert!(RelationName::from_config(name.as_str()).is_ok());
        }
        assert_eq!(
            RelationName::parse("soap").unwrap().companion(COMPANION_PRIMARY_KEY).quoted(),
            "\"soap__pk\""
        );
    }

    #[test]
    fn test_from_stored_flags_corrupt_rows_as_internal() {
        let err = RelationName::from_stored("bad name").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(RelationName::from_stored("soap").unwrap().quoted(), "\"soap\"");
    }
}
