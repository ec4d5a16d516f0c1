//! SQL execution over `may_postgres`.
//!
//! [`SqlExecutor`] is the seam every PostgreSQL statement in the crate goes
//! through. It is implemented by [`PgExecutor`] (a plain client) and by
//! [`Transaction`](crate::transaction::Transaction), so the backend can run
//! the same helpers inside or outside a transaction.

use may_postgres::types::ToSql;
use may_postgres::{Client, Error as PostgresError, Row};
use std::fmt;
use std::time::Instant;

use crate::metrics::tracing_helpers;
use crate::transaction::{Transaction, TransactionError};
#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

/// Database error type
#[derive(Debug)]
pub enum DbError {
    /// `PostgreSQL` error from `may_postgres`
    PostgresError(PostgresError),
    /// No connection could be checked out of the pool in time
    PoolTimeout(String),
    /// Row parsing/conversion error
    ParseError(String),
    /// Other execution errors
    Other(String),
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbError::PostgresError(e) => write!(f, "PostgreSQL error: {e}"),
            DbError::PoolTimeout(s) => write!(f, "Pool timeout: {s}"),
            DbError::ParseError(s) => write!(f, "Parse error: {s}"),
            DbError::Other(s) => write!(f, "Execution error: {s}"),
        }
    }
}

impl std::error::Error for DbError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DbError::PostgresError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PostgresError> for DbError {
    fn from(err: PostgresError) -> Self {
        DbError::PostgresError(err)
    }
}

/// Trait for executing database operations
///
/// Statements use positional parameters (`$1`, `$2`, ...). Identifiers are
/// never bound as parameters; callers splice them in only through
/// [`RelationName::quoted`](crate::catalog::identifier::RelationName::quoted).
pub trait SqlExecutor {
    /// Execute a SQL statement and return the number of rows affected
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the statement fails.
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, DbError>;

    /// Execute a query that must return exactly one row
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the query fails or does not return exactly one row.
    fn query_one(&self, query: &str, params: &[&dyn ToSql]) -> Result<Row, DbError>;

    /// Execute a query and return all rows
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the query fails.
    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, DbError>;
}

/// Run one client call with the query span and metrics wrapped around it.
pub(crate) fn instrumented<T>(
    query: &str,
    call: impl FnOnce() -> Result<T, PostgresError>,
) -> Result<T, DbError> {
    let _span = tracing_helpers::execute_query_span(query).entered();

    let start = Instant::now();
    let result = call().map_err(|e| {
        #[cfg(feature = "metrics")]
        METRICS.record_query_error();
        DbError::PostgresError(e)
    });

    let duration = start.elapsed();
    #[cfg(feature = "metrics")]
    METRICS.record_query_duration(duration);
    #[cfg(not(feature = "metrics"))]
    let _ = duration;

    result
}

/// Implementation of `SqlExecutor` for `may_postgres::Client`
pub struct PgExecutor {
    client: Client,
}

impl PgExecutor {
    /// Create a new executor from a `may_postgres::Client`
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Start a transaction.
    ///
    /// The transaction borrows this executor; the connection cannot be
    /// handed to anyone else until it is committed or dropped.
    ///
    /// # Errors
    ///
    /// Returns `TransactionError` if `BEGIN` fails.
    pub fn begin(&self) -> Result<Transaction<'_>, TransactionError> {
        Transaction::new(&self.client)
    }
}

impl SqlExecutor for PgExecutor {
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, DbError> {
        instrumented(query, || self.client.execute(query, params))
    }

    fn query_one(&self, query: &str, params: &[&dyn ToSql]) -> Result<Row, DbError> {
        instrumented(query, || self.client.query_one(query, params))
    }

    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, DbError> {
        instrumented(query, || self.client.query(query, params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_error_display() {
        let err = DbError::PoolTimeout("no slot after 5s".to_string());
        assert!(err.to_string().contains("Pool timeout"));
        assert!(err.to_string().contains("no slot after 5s"));
    }

    #[test]
    fn test_db_error_all_variants() {
        let err = DbError::ParseError("price".to_string());
        assert!(err.to_string().contains("Parse error"));

        let err = DbError::Other("test".to_string());
        assert!(err.to_string().contains("Execution error"));
    }
}
