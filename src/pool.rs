//! Connection pool of persistent `may_postgres` connections.
//!
//! The pool owns a fixed number of slots circulating through a bounded
//! `crossbeam-channel`. Checking a slot out removes it from the channel, so
//! a connection is used by exactly one caller at a time (which transactions
//! require); dropping the [`PooledConnection`] puts it back. A slot whose
//! connection failed is returned empty and reconnected lazily by the next
//! caller that draws it.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::config::DatabaseConfig;
use crate::connection::{connect, validate_connection_string, ConnectionError};
use crate::executor::{DbError, PgExecutor};
#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

type Slot = Option<PgExecutor>;

/// Process-wide pool, created at startup and closed at shutdown.
pub struct DbPool {
    url: String,
    statement_timeout_seconds: u64,
    acquire_timeout: Duration,
    closed: AtomicBool,
    slots_tx: Sender<Slot>,
    slots_rx: Receiver<Slot>,
}

impl DbPool {
    /// Open `max_connections` connections eagerly.
    ///
    /// Fails if the first connection cannot be established; later failures
    /// leave empty slots that are retried on checkout.
    pub fn connect(config: &DatabaseConfig) -> Result<Self, ConnectionError> {
        validate_connection_string(&config.url)?;

        let size = config.max_connections.max(1);
        let (slots_tx, slots_rx) = bounded(size);
        let pool = Self {
            url: config.url.clone(),
            statement_timeout_seconds: config.statement_timeout_seconds,
            acquire_timeout: Duration::from_secs(config.pool_timeout_seconds.max(1)),
            closed: AtomicBool::new(false),
            slots_tx,
            slots_rx,
        };

        let first = connect(&pool.url, pool.statement_timeout_seconds)?;
        pool.put_back(Some(PgExecutor::new(first)));
        for n in 1..size {
            match connect(&pool.url, pool.statement_timeout_seconds) {
                Ok(client) => pool.put_back(Some(PgExecutor::new(client))),
                Err(e) => {
                    log::warn!("Connection {} of {} failed at startup: {}", n + 1, size, e);
                    pool.put_back(None);
                }
            }
        }

        log::info!("Connection pool ready with {} slots", size);
        Ok(pool)
    }

    /// Check out a connection, waiting up to the configured timeout.
    ///
    /// # Errors
    ///
    /// `DbError::PoolTimeout` when no slot frees up in time, or the
    /// connection error when an empty slot cannot be reconnected.
    pub fn acquire(&self) -> Result<PooledConnection<'_>, DbError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DbError::PoolTimeout("connection pool is closed".to_string()));
        }
        let start = Instant::now();
        let slot = match self.slots_rx.recv_timeout(self.acquire_timeout) {
            Ok(slot) => slot,
            Err(RecvTimeoutError::Timeout) => {
                return Err(DbError::PoolTimeout(format!(
                    "no connection available within {:?}",
                    self.acquire_timeout
                )))
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(DbError::PoolTimeout("connection pool is closed".to_string()))
            }
        };
        #[cfg(feature = "metrics")]
        METRICS.observe_pool_wait(start.elapsed());
        #[cfg(not(feature = "metrics"))]
        let _ = start;

        let executor = match slot {
            Some(executor) => executor,
            None => match connect(&self.url, self.statement_timeout_seconds) {
                Ok(client) => {
                    log::info!("Reconnected pooled connection");
                    PgExecutor::new(client)
                }
                Err(e) => {
                    self.put_back(None);
                    return Err(DbError::Other(format!("reconnect failed: {e}")));
                }
            },
        };

        Ok(PooledConnection {
            pool: self,
            executor: Some(executor),
            broken: false,
        })
    }

    /// Drain and drop every idle connection.
    ///
    /// Connections still checked out are dropped when their guard is, because
    /// the pool no longer accepts them back once closed.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let mut closed = 0;
        while let Ok(slot) = self.slots_rx.try_recv() {
            if slot.is_some() {
                closed += 1;
            }
        }
        log::info!("Connection pool closed ({} connections released)", closed);
    }

    fn put_back(&self, slot: Slot) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let _ = self.slots_tx.try_send(slot);
    }
}

/// A checked-out connection; returns to the pool on drop.
pub struct PooledConnection<'a> {
    pool: &'a DbPool,
    executor: Option<PgExecutor>,
    broken: bool,
}

impl PooledConnection<'_> {
    /// Discard the connection instead of returning it to the pool.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }
}

impl Deref for PooledConnection<'_> {
    type Target = PgExecutor;

    fn deref(&self) -> &PgExecutor {
        self.executor
            .as_ref()
            .expect("executor is present until the guard is dropped")
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        let executor = self.executor.take();
        if self.broken {
            log::warn!("Discarding broken pooled connection");
            self.pool.put_back(None);
        } else {
            self.pool.put_back(executor);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_rejects_invalid_url_without_dialing() {
        let config = DatabaseConfig {
            url: "mysql://nope".to_string(),
            ..DatabaseConfig::default()
        };
        match DbPool::connect(&config) {
            Err(ConnectionError::InvalidConnectionString(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("invalid url should not produce a pool"),
        }
    }
}
