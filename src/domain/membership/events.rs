//! Member domain events.
//!
//! Every event is about one member and carries the caller category that
//! caused it. Events are buffered during a unit of work and dispatched only
//! after it commits.
//!
//! # Event types
//!
//! | Kind | Envelope type |
//! |------|---------------|
//! | `Created` | `member.created.v1` |
//! | `NewsletterSubscription` | `member.newsletter_subscription.v1` |
//! | `SubscriptionCreated` | `subscription.created.v1` |
//! | `SubscriptionLifecycle` | `subscription.lifecycle.v1` |
//! | `SubscriptionCancelled` | `subscription.cancelled.v1` |
//! | `StatusChanged` | `member.status_changed.v1` |
//! | `EmailChanged` | `member.email_changed.v1` |
//! | `ProductChanged` | `member.product_changed.v1` |

use serde::{Deserialize, Serialize};

use crate::domain::billing::TransitionKind;
use crate::domain::foundation::{
    DomainEvent, EventId, EventSource, MemberId, NewsletterId, OfferId, ProductId,
    SubscriptionRecordId, Timestamp,
};

use super::{Attribution, MemberStatus, ProductChange};

/// A change that happened to a member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberEvent {
    pub event_id: EventId,
    pub member_id: MemberId,
    pub source: EventSource,
    pub occurred_at: Timestamp,
    #[serde(flatten)]
    pub kind: MemberEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MemberEventKind {
    Created {
        email: String,
        status: MemberStatus,
    },

    /// Newsletter subscribed (`subscribed = true`) or unsubscribed.
    NewsletterSubscription {
        newsletter_id: NewsletterId,
        subscribed: bool,
    },

    /// First sighting of an external subscription.
    SubscriptionCreated {
        subscription_id: String,
        record_id: SubscriptionRecordId,
        product_id: Option<ProductId>,
        offer_id: Option<OfferId>,
        mrr_delta: i64,
        attribution: Option<Attribution>,
    },

    /// A material change to a known subscription.
    SubscriptionLifecycle {
        subscription_id: String,
        record_id: SubscriptionRecordId,
        transition: TransitionKind,
        mrr_delta: i64,
    },

    SubscriptionCancelled {
        subscription_id: String,
        record_id: SubscriptionRecordId,
        cancellation_reason: Option<String>,
    },

    StatusChanged {
        from: MemberStatus,
        to: MemberStatus,
    },

    EmailChanged {
        from: String,
        to: String,
    },

    ProductChanged {
        product_id: ProductId,
        change: ProductChange,
    },
}

impl MemberEvent {
    /// Creates an event that occurred now.
    pub fn new(member_id: MemberId, source: EventSource, kind: MemberEventKind) -> Self {
        Self {
            event_id: EventId::new(),
            member_id,
            source,
            occurred_at: Timestamp::now(),
            kind,
        }
    }

    /// Overrides the occurrence time, e.g. with a subscription's start date.
    pub fn occurred(mut self, at: Timestamp) -> Self {
        self.occurred_at = at;
        self
    }

    pub fn created(member_id: MemberId, source: EventSource, email: &str, status: MemberStatus) -> Self {
        Self::new(
            member_id,
            source,
            MemberEventKind::Created {
                email: email.to_string(),
                status,
            },
        )
    }

    pub fn newsletter(
        member_id: MemberId,
        source: EventSource,
        newsletter_id: NewsletterId,
        subscribed: bool,
    ) -> Self {
        Self::new(
            member_id,
            source,
            MemberEventKind::NewsletterSubscription {
                newsletter_id,
                subscribed,
            },
        )
    }

    pub fn status_changed(
        member_id: MemberId,
        source: EventSource,
        from: MemberStatus,
        to: MemberStatus,
    ) -> Self {
        Self::new(member_id, source, MemberEventKind::StatusChanged { from, to })
    }

    pub fn product_changed(
        member_id: MemberId,
        source: EventSource,
        product_id: ProductId,
        change: ProductChange,
    ) -> Self {
        Self::new(
            member_id,
            source,
            MemberEventKind::ProductChanged { product_id, change },
        )
    }

    pub fn email_changed(member_id: MemberId, source: EventSource, from: &str, to: &str) -> Self {
        Self::new(
            member_id,
            source,
            MemberEventKind::EmailChanged {
                from: from.to_string(),
                to: to.to_string(),
            },
        )
    }
}

impl DomainEvent for MemberEvent {
    fn event_type(&self) -> &'static str {
        match &self.kind {
            MemberEventKind::Created { .. } => "member.created.v1",
            MemberEventKind::NewsletterSubscription { .. } => "member.newsletter_subscription.v1",
            MemberEventKind::SubscriptionCreated { .. } => "subscription.created.v1",
            MemberEventKind::SubscriptionLifecycle { .. } => "subscription.lifecycle.v1",
            MemberEventKind::SubscriptionCancelled { .. } => "subscription.cancelled.v1",
            MemberEventKind::StatusChanged { .. } => "member.status_changed.v1",
            MemberEventKind::EmailChanged { .. } => "member.email_changed.v1",
            MemberEventKind::ProductChanged { .. } => "member.product_changed.v1",
        }
    }

    fn aggregate_id(&self) -> String {
        self.member_id.to_string()
    }

    fn aggregate_type(&self) -> &'static str {
        "Member"
    }

    fn occurred_at(&self) -> Timestamp {
        self.occurred_at
    }

    fn event_id(&self) -> EventId {
        self.event_id.clone()
    }

    fn source(&self) -> EventSource {
        self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::SerializableDomainEvent;

    #[test]
    fn status_changed_envelope_has_type_and_payload() {
        let member_id = MemberId::new();
        let event = MemberEvent::status_changed(
            member_id,
            EventSource::System,
            MemberStatus::Free,
            MemberStatus::Paid,
        );

        let envelope = event.to_envelope().unwrap();

        assert_eq!(envelope.event_type, "member.status_changed.v1");
        assert_eq!(envelope.aggregate_id, member_id.to_string());
        assert_eq!(envelope.aggregate_type, "Member");
        assert_eq!(envelope.payload["kind"], "status_changed");
        assert_eq!(envelope.payload["from"], "free");
        assert_eq!(envelope.payload["to"], "paid");
        assert_eq!(envelope.metadata.source, Some(EventSource::System));
    }

    #[test]
    fn occurred_overrides_timestamp() {
        let at = Timestamp::from_unix_secs(1_600_000_000);
        let event = MemberEvent::created(MemberId::new(), EventSource::Import, "a@b.c", MemberStatus::Free)
            .occurred(at);
        assert_eq!(event.occurred_at(), at);
    }

    #[test]
    fn payload_round_trips_through_envelope() {
        let event = MemberEvent::product_changed(
            MemberId::new(),
            EventSource::Admin,
            ProductId::new(),
            ProductChange::Removed,
        );
        let envelope = event.to_envelope().unwrap();
        let back: MemberEvent = envelope.payload_as().unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn lifecycle_event_type() {
        let event = MemberEvent::new(
            MemberId::new(),
            EventSource::System,
            MemberEventKind::SubscriptionLifecycle {
                subscription_id: "sub_1".to_string(),
                record_id: SubscriptionRecordId::new(),
                transition: TransitionKind::Canceled,
                mrr_delta: -500,
            },
        );
        assert_eq!(event.event_type(), "subscription.lifecycle.v1");
        assert_eq!(event.to_envelope().unwrap().payload["transition"], "canceled");
    }
}
