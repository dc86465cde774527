//! In-process event bus.
//!
//! Delivers member events to registered handlers synchronously, in publish
//! order, and keeps a copy of everything published for inspection. Used by
//! tests and by single-process deployments without an external broker.
//!
//! Internal locks are std `RwLock`s that are never held across an await.
//! A poisoned lock panics.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::domain::foundation::{DomainError, ErrorCode, EventEnvelope, MemberId};
use crate::domain::membership::MemberEvent;
use crate::ports::{EventHandler, EventPublisher, EventSubscriber};

/// In-memory event bus.
///
/// # Example
///
/// ```ignore
/// let bus = Arc::new(InMemoryEventBus::new());
/// bus.subscribe("member.status_changed.v1", Arc::new(WelcomeMailer::new()));
///
/// let handler = LinkSubscriptionHandler::new(store, billing, products, offers, bus.clone(), policy);
/// handler.handle(cmd).await?;
///
/// assert!(bus.has_event("subscription.created.v1"));
/// ```
pub struct InMemoryEventBus {
    handlers: RwLock<HashMap<String, Vec<Arc<dyn EventHandler>>>>,
    published: RwLock<Vec<EventEnvelope>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            published: RwLock::new(Vec::new()),
        }
    }

    /// Everything published so far, in publish order.
    pub fn published_events(&self) -> Vec<EventEnvelope> {
        self.published
            .read()
            .expect("InMemoryEventBus: published lock poisoned")
            .clone()
    }

    /// Event types in publish order.
    pub fn event_types(&self) -> Vec<String> {
        self.published
            .read()
            .expect("InMemoryEventBus: published lock poisoned")
            .iter()
            .map(|e| e.event_type.clone())
            .collect()
    }

    pub fn events_of_type(&self, event_type: &str) -> Vec<EventEnvelope> {
        self.published_events()
            .into_iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }

    /// Decoded member events for one member, in publish order.
    ///
    /// Envelopes whose payload is not a member event are skipped.
    pub fn events_for_member(&self, member_id: &MemberId) -> Vec<MemberEvent> {
        let aggregate_id = member_id.to_string();
        self.published_events()
            .into_iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .filter_map(|e| e.payload_as::<MemberEvent>().ok())
            .collect()
    }

    pub fn clear(&self) {
        self.published
            .write()
            .expect("InMemoryEventBus: published write lock poisoned")
            .clear();
    }

    pub fn event_count(&self) -> usize {
        self.published
            .read()
            .expect("InMemoryEventBus: published lock poisoned")
            .len()
    }

    pub fn has_event(&self, event_type: &str) -> bool {
        self.published
            .read()
            .expect("InMemoryEventBus: published lock poisoned")
            .iter()
            .any(|e| e.event_type == event_type)
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, event: EventEnvelope) -> Result<(), DomainError> {
        self.published
            .write()
            .expect("InMemoryEventBus: published write lock poisoned")
            .push(event.clone());

        // Clone handlers so the lock is released before awaiting them
        let type_handlers: Vec<Arc<dyn EventHandler>> = {
            let handlers = self
                .handlers
                .read()
                .expect("InMemoryEventBus: handlers lock poisoned");
            handlers
                .get(&event.event_type)
                .cloned()
                .unwrap_or_default()
        };

        let mut errors = Vec::new();
        for handler in type_handlers {
            if let Err(e) = handler.handle(event.clone()).await {
                tracing::warn!(
                    handler = handler.name(),
                    event_type = %event.event_type,
                    event_id = %event.event_id,
                    error = %e,
                    "Event handler failed"
                );
                errors.push(format!("{}: {}", handler.name(), e));
            }
        }

        if !errors.is_empty() {
            return Err(DomainError::new(
                ErrorCode::EventDispatchFailed,
                format!("Handler errors: {}", errors.join(", ")),
            ));
        }

        Ok(())
    }

    /// Delivers every event even if an earlier one had failing handlers.
    async fn publish_all(&self, events: Vec<EventEnvelope>) -> Result<(), DomainError> {
        let mut first_error = None;
        for event in events {
            if let Err(e) = self.publish(event).await {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl EventSubscriber for InMemoryEventBus {
    fn subscribe(&self, event_type: &str, handler: Arc<dyn EventHandler>) {
        let mut handlers = self
            .handlers
            .write()
            .expect("InMemoryEventBus: handlers write lock poisoned");
        handlers
            .entry(event_type.to_string())
            .or_default()
            .push(handler);
    }

    fn subscribe_all(&self, event_types: &[&str], handler: Arc<dyn EventHandler>) {
        let mut handlers = self
            .handlers
            .write()
            .expect("InMemoryEventBus: handlers write lock poisoned");
        for event_type in event_types {
            handlers
                .entry(event_type.to_string())
                .or_default()
                .push(Arc::clone(&handler));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{EventSource, SerializableDomainEvent};
    use crate::domain::membership::{MemberEventKind, MemberStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler(Arc<AtomicUsize>);

    #[async_trait]
    impl EventHandler for CountingHandler {
        async fn handle(&self, _: EventEnvelope) -> Result<(), DomainError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn name(&self) -> &'static str {
            "CountingHandler"
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl EventHandler for FailingHandler {
        async fn handle(&self, _: EventEnvelope) -> Result<(), DomainError> {
            Err(DomainError::new(ErrorCode::InternalError, "mailer down"))
        }
        fn name(&self) -> &'static str {
            "FailingHandler"
        }
    }

    fn created(member_id: MemberId) -> EventEnvelope {
        MemberEvent::created(member_id, EventSource::Api, "a@example.com", MemberStatus::Free)
            .to_envelope()
            .unwrap()
    }

    fn status_changed(member_id: MemberId) -> EventEnvelope {
        MemberEvent::status_changed(
            member_id,
            EventSource::System,
            MemberStatus::Free,
            MemberStatus::Paid,
        )
        .to_envelope()
        .unwrap()
    }

    #[tokio::test]
    async fn publish_records_events_in_order() {
        let bus = InMemoryEventBus::new();
        let member_id = MemberId::new();

        bus.publish_all(vec![created(member_id), status_changed(member_id)])
            .await
            .unwrap();

        assert_eq!(
            bus.event_types(),
            vec!["member.created.v1", "member.status_changed.v1"]
        );
        assert_eq!(bus.events_of_type("member.created.v1").len(), 1);
    }

    #[tokio::test]
    async fn events_for_member_decodes_payloads() {
        let bus = InMemoryEventBus::new();
        let alice = MemberId::new();
        let bob = MemberId::new();

        bus.publish(created(alice)).await.unwrap();
        bus.publish(created(bob)).await.unwrap();
        bus.publish(status_changed(alice)).await.unwrap();

        let events = bus.events_for_member(&alice);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0].kind, MemberEventKind::Created { .. }));
        assert!(matches!(
            events[1].kind,
            MemberEventKind::StatusChanged {
                to: MemberStatus::Paid,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn subscribed_handlers_receive_matching_events() {
        let bus = InMemoryEventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));

        bus.subscribe_all(
            &["member.created.v1", "member.status_changed.v1"],
            Arc::new(CountingHandler(counter.clone())),
        );
        bus.subscribe("member.created.v1", Arc::new(CountingHandler(counter.clone())));

        let member_id = MemberId::new();
        bus.publish(created(member_id)).await.unwrap();
        bus.publish(status_changed(member_id)).await.unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn failing_handler_does_not_stop_later_events() {
        let bus = InMemoryEventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        bus.subscribe("member.created.v1", Arc::new(FailingHandler));
        bus.subscribe(
            "member.status_changed.v1",
            Arc::new(CountingHandler(counter.clone())),
        );

        let member_id = MemberId::new();
        let result = bus
            .publish_all(vec![created(member_id), status_changed(member_id)])
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.code, ErrorCode::EventDispatchFailed);
        assert!(err.message.contains("FailingHandler"));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(bus.event_count(), 2);
    }

    #[tokio::test]
    async fn clear_forgets_published_events() {
        let bus = InMemoryEventBus::new();
        bus.publish(created(MemberId::new())).await.unwrap();

        bus.clear();

        assert_eq!(bus.event_count(), 0);
        assert!(!bus.has_event("member.created.v1"));
    }
}
