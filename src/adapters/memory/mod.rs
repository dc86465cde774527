//! In-memory persistence adapters.
//!
//! Used by tests and local development. Same semantics as the Postgres
//! adapters, including member row locks.

mod catalog;
mod member_store;

pub use catalog::{InMemoryOfferRepository, InMemoryProductRepository};
pub use member_store::InMemoryMemberStore;
