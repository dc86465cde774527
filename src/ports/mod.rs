//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Billing
//!
//! - `BillingProvider` - Provider subscription/customer reads and mutations
//!
//! ## Persistence
//!
//! - `MemberStore` / `MemberUnitOfWork` - Transactional member persistence
//! - `ProductRepository` - Product lookup and price linking
//! - `OfferRepository` - Offer lookup
//!
//! ## Event Ports
//!
//! - `EventPublisher` - Port for publishing domain events
//! - `EventSubscriber` - Port for subscribing to domain events
//! - `EventHandler` - Handler that processes incoming events

mod billing_provider;
mod event_publisher;
mod event_subscriber;
mod member_store;
mod offer_repository;
mod product_repository;

pub use billing_provider::{
    BillingError, BillingErrorCode, BillingProvider, CreateCustomerRequest, Customer,
};
pub use event_publisher::EventPublisher;
pub use event_subscriber::{EventBus, EventHandler, EventSubscriber};
pub use member_store::{MemberStore, MemberUnitOfWork, UpsertOutcome};
pub use offer_repository::OfferRepository;
pub use product_repository::ProductRepository;
