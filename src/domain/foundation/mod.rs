//! Foundation module - Shared domain primitives.
//!
//! Contains value objects, identifiers, error types and event
//! infrastructure shared by the billing and membership modules.

mod errors;
mod event_source;
mod events;
mod ids;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use event_source::EventSource;
pub use events::{DomainEvent, EventEnvelope, EventId, EventMetadata, SerializableDomainEvent};
pub use ids::{MemberId, NewsletterId, OfferId, ProductId, SubscriptionRecordId};
pub use timestamp::Timestamp;
