//! Transaction support.
//!
//! A [`Transaction`] borrows the connection it runs on, implements
//! [`SqlExecutor`], and rolls back if dropped without [`Transaction::commit`].
//! Category provisioning relies on this: the registry insert and the
//! `CREATE TABLE` either commit together or not at all.

use crate::executor::{instrumented, DbError, SqlExecutor};
use crate::metrics::tracing_helpers;
use may_postgres::types::ToSql;
use may_postgres::{Client, Error as PostgresError, Row};
use std::fmt;

/// Transaction error type
#[derive(Debug)]
pub enum TransactionError {
    /// PostgreSQL error from may_postgres
    PostgresError(PostgresError),
    /// Transaction already committed or rolled back
    TransactionClosed,
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionError::PostgresError(e) => {
                write!(f, "PostgreSQL error: {}", e)
            }
            TransactionError::TransactionClosed => {
                write!(f, "Transaction has already been committed or rolled back")
            }
        }
    }
}

impl std::error::Error for TransactionError {}

impl From<PostgresError> for TransactionError {
    fn from(err: PostgresError) -> Self {
        TransactionError::PostgresError(err)
    }
}

impl From<TransactionError> for DbError {
    fn from(err: TransactionError) -> Self {
        match err {
            TransactionError::PostgresError(e) => DbError::PostgresError(e),
            TransactionError::TransactionClosed => {
                DbError::Other("Transaction closed".to_string())
            }
        }
    }
}

/// A database transaction on a borrowed connection
pub struct Transaction<'a> {
    client: &'a Client,
    closed: bool,
}

impl<'a> Transaction<'a> {
    /// `BEGIN` at the server default isolation level (`READ COMMITTED`).
    pub(crate) fn new(client: &'a Client) -> Result<Self, TransactionError> {
        let _span = tracing_helpers::begin_transaction_span().entered();
        client.execute("BEGIN", &[])?;

        Ok(Self {
            client,
            closed: false,
        })
    }

    /// Commit the transaction
    ///
    /// # Errors
    ///
    /// Returns an error if `COMMIT` fails or the transaction is already closed.
    pub fn commit(mut self) -> Result<(), TransactionError> {
        if self.closed {
            return Err(TransactionError::TransactionClosed);
        }

        let _span = tracing_helpers::commit_transaction_span().entered();

        // Mark closed first: a failed COMMIT leaves nothing for Drop to roll back.
        self.closed = true;
        self.client.execute("COMMIT", &[])?;
        Ok(())
    }

    fn rollback(&self) -> Result<(), TransactionError> {
        let _span = tracing_helpers::rollback_transaction_span().entered();
        self.client.execute("ROLLBACK", &[])?;
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), DbError> {
        if self.closed {
            return Err(DbError::Other("Transaction is closed".to_string()));
        }
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            if let Err(e) = self.rollback() {
                log::warn!("Rollback of abandoned transaction failed: {}", e);
            }
        }
    }
}

impl SqlExecutor for Transaction<'_> {
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, DbError> {
        self.ensure_open()?;
        instrumented(query, || self.client.execute(query, params))
    }

    fn query_one(&self, query: &str, params: &[&dyn ToSql]) -> Result<Row, DbError> {
        self.ensure_open()?;
        instrumented(query, || self.client.query_one(query, params))
    }

    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, DbError> {
        self.ensure_open()?;
        instrumented(query, || self.client.query(query, params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_error_conversion() {
        let err = TransactionError::TransactionClosed;
        assert!(err
            .to_string()
            .contains("Transaction has already been committed"));

        let db_err: DbError = err.into();
        assert!(db_err.to_string().contains("Transaction closed"));
    }
}
