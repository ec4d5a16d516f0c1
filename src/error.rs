//! Error taxonomy for catalog operations.
//!
//! Backends report [`StoreError`], a storage-level classification. The
//! catalog components turn it into [`CatalogError`], adding the category or
//! product the failure concerns. Every `CatalogError` has exactly one
//! [`ErrorKind`], which is what callers (and the HTTP adapter) branch on.

use std::fmt;

use may_postgres::error::SqlState;

use crate::executor::DbError;

/// Stable, caller-facing error classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    AlreadyExists,
    Unavailable,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::NotFound => "not_found",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage-level failure, already classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    UniqueViolation(String),
    /// The relation a registered category points at does not exist.
    MissingRelation(String),
    /// A relation with this name already exists.
    RelationExists(String),
    /// The storage engine could not be reached or timed out.
    Unavailable(String),
    /// Anything else.
    Other(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::UniqueViolation(s) => write!(f, "unique constraint violated: {s}"),
            StoreError::MissingRelation(s) => write!(f, "relation missing: {s}"),
            StoreError::RelationExists(s) => write!(f, "relation already exists: {s}"),
            StoreError::Unavailable(s) => write!(f, "storage unavailable: {s}"),
            StoreError::Other(s) => write!(f, "storage error: {s}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Connection-level failures that reach us without a SQLSTATE.
const UNAVAILABLE_PATTERNS: &[&str] = &[
    "connection closed",
    "error communicating with the server",
    "error connecting to server",
    "connection refused",
    "broken pipe",
    "timed out",
    "canceling statement",
    "reconnect failed",
];

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        classify(&err)
    }
}

/// Classify a database error.
///
/// Server errors carry a SQLSTATE and are classified by it. Errors raised
/// before a statement reaches the server (socket, pool) have none and fall
/// back to their message.
pub fn classify(error: &DbError) -> StoreError {
    let msg = error.to_string();
    match error {
        DbError::PoolTimeout(_) => StoreError::Unavailable(msg),
        DbError::PostgresError(e) => match e.code() {
            Some(state) => classify_sqlstate(state, msg),
            None => classify_message(msg),
        },
        DbError::ParseError(_) => StoreError::Other(msg),
        DbError::Other(_) => classify_message(msg),
    }
}

pub(crate) fn classify_sqlstate(state: &SqlState, msg: String) -> StoreError {
    if *state == SqlState::UNIQUE_VIOLATION {
        StoreError::UniqueViolation(msg)
    } else if *state == SqlState::UNDEFINED_TABLE {
        StoreError::MissingRelation(msg)
    } else if *state == SqlState::DUPLICATE_TABLE {
        StoreError::RelationExists(msg)
    } else if is_transient(state.code()) {
        StoreError::Unavailable(msg)
    } else {
        StoreError::Other(msg)
    }
}

/// Classes 08 (connection), 40 (rollback), 53 (resources) and 57 (operator
/// intervention, which includes statement timeouts and shutdowns).
fn is_transient(code: &str) -> bool {
    ["08", "40", "53", "57"]
        .iter()
        .any(|class| code.starts_with(class))
}

fn classify_message(msg: String) -> StoreError {
    let lower = msg.to_lowercase();
    if UNAVAILABLE_PATTERNS.iter().any(|p| lower.contains(p)) {
        StoreError::Unavailable(msg)
    } else {
        StoreError::Other(msg)
    }
}

/// Error returned by every catalog operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// Malformed or missing input, including labels that cannot become a
    /// safe relation identifier.
    InvalidInput(String),
    /// The category label does not resolve to a registered category.
    CategoryNotFound(String),
    /// The category exists but has no product with this id.
    ProductNotFound { category: String, id: i64 },
    /// A category with the same canonical name is already registered.
    CategoryExists(String),
    /// A product with the same name and brand exists in the category.
    DuplicateProduct {
        category: String,
        name: String,
        brand: Option<String>,
    },
    /// Creating the category's relation failed; the registration was rolled back.
    Provisioning {
        category: String,
        reason: String,
        retryable: bool,
    },
    Unavailable(String),
    Internal(String),
}

impl CatalogError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CatalogError::InvalidInput(_) => ErrorKind::InvalidInput,
            CatalogError::CategoryNotFound(_) | CatalogError::ProductNotFound { .. } => {
                ErrorKind::NotFound
            }
            CatalogError::CategoryExists(_) | CatalogError::DuplicateProduct { .. } => {
                ErrorKind::AlreadyExists
            }
            CatalogError::Provisioning { retryable: true, .. } | CatalogError::Unavailable(_) => {
                ErrorKind::Unavailable
            }
            CatalogError::Provisioning { .. } | CatalogError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        CatalogError::InvalidInput(msg.into())
    }

    /// Map a storage failure that has no operation-specific meaning.
    pub(crate) fn from_store(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(s) => CatalogError::Unavailable(s),
            other => CatalogError::Internal(other.to_string()),
        }
    }
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::InvalidInput(s) => write!(f, "{s}"),
            CatalogError::CategoryNotFound(c) => write!(f, "category '{c}' does not exist"),
            CatalogError::ProductNotFound { category, id } => {
                write!(f, "product {id} not found in category '{category}'")
            }
            CatalogError::CategoryExists(c) => write!(f, "category '{c}' already exists"),
            CatalogError::DuplicateProduct {
                category,
                name,
                brand,
            } => match brand {
                Some(b) => write!(f, "product '{name}' ({b}) already exists in category '{category}'"),
                None => write!(f, "product '{name}' already exists in category '{category}'"),
            },
            CatalogError::Provisioning {
                category, reason, ..
            } => write!(f, "could not provision relation for category '{category}': {reason}"),
            CatalogError::Unavailable(s) => write!(f, "storage unavailable: {s}"),
            CatalogError::Internal(s) => write!(f, "internal error: {s}"),
        }
    }
}

impl std::error::Error for CatalogError {}
