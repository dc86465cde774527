//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `events` - In-memory event bus
//! - `memory` - In-memory member store and catalog, for tests and local runs
//! - `postgres` - PostgreSQL persistence
//! - `stripe` - Stripe billing provider and its mock
//! - `disabled_billing` - Provider that rejects every call, for billing-off deployments

pub mod disabled_billing;
pub mod events;
pub mod memory;
pub mod postgres;
pub mod stripe;

pub use disabled_billing::DisabledBillingProvider;
pub use events::InMemoryEventBus;
pub use memory::{InMemoryMemberStore, InMemoryOfferRepository, InMemoryProductRepository};
pub use postgres::{PostgresMemberStore, PostgresOfferRepository, PostgresProductRepository};
pub use stripe::{MockBillingProvider, StripeBillingProvider, StripeConfig};
