//! # Stockroom
//!
//! Inventory catalog where every product category is its own PostgreSQL
//! relation, created at runtime when the category is registered.
//!
//! * [`catalog`]: registry, per-category product CRUD, cross-category fan-out
//! * [`backend`]: the storage seam, with PostgreSQL and in-memory implementations
//! * [`pool`], [`executor`], [`transaction`], [`connection`]: `may_postgres` plumbing
//! * [`http`]: JSON routes over `may_minihttp`
//!
//! All blocking I/O runs on `may` coroutines.

pub mod backend;
pub mod catalog;
pub mod config;
pub mod connection;
pub mod error;
pub mod executor;
pub mod http;
pub mod metrics;
pub mod pool;
pub mod transaction;

pub use catalog::Catalog;
pub use error::{CatalogError, ErrorKind};
