//! EventPublisher port - the domain event bus, publishing side.
//!
//! Member events reach downstream consumers (email, analytics, webhooks)
//! through this port, always after the unit of work that produced them has
//! committed.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, EventEnvelope};

/// Port for publishing domain events.
///
/// Delivery is fire-and-forget and at-least-once: subscribers must tolerate
/// duplicates. Envelopes passed to `publish_all` are delivered in order.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a single event.
    async fn publish(&self, event: EventEnvelope) -> Result<(), DomainError>;

    /// Publish several events, preserving their order.
    async fn publish_all(&self, events: Vec<EventEnvelope>) -> Result<(), DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_publisher_is_object_safe() {
        fn _accepts_dyn(_publisher: &dyn EventPublisher) {}
    }
}
