//! EventSubscriber port - the domain event bus, consuming side.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::foundation::{DomainError, EventEnvelope};

/// Consumer of member events, e.g. a welcome-email sender.
///
/// Handlers must be idempotent; the bus delivers at least once.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: EventEnvelope) -> Result<(), DomainError>;

    /// Name used in logs.
    fn name(&self) -> &'static str;
}

/// Registration of handlers by event type (e.g. `member.status_changed.v1`).
pub trait EventSubscriber: Send + Sync {
    fn subscribe(&self, event_type: &str, handler: Arc<dyn EventHandler>);

    fn subscribe_all(&self, event_types: &[&str], handler: Arc<dyn EventHandler>);
}

/// Both halves of an event bus.
pub trait EventBus: super::EventPublisher + EventSubscriber {}

impl<T: super::EventPublisher + EventSubscriber> EventBus for T {}
