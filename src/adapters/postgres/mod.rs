//! PostgreSQL adapters - Database implementations for persistence ports.
//!
//! - `PostgresMemberStore` - Transactional member store (row locks, savepoints)
//! - `PostgresProductRepository` / `PostgresOfferRepository` - Catalog lookups
//! - `connect` / `run_migrations` - Pool setup from `DatabaseConfig`

mod catalog;
mod member_store;
mod pool;

pub use catalog::{PostgresOfferRepository, PostgresProductRepository};
pub use member_store::PostgresMemberStore;
pub use pool::{connect, run_migrations};
