//! Shared handler dependencies.
//!
//! Holds the ports once and builds handlers on demand, so a transport layer
//! (HTTP routes, a webhook consumer, an import job) clones one value instead
//! of wiring every handler itself.

use std::sync::Arc;

use crate::config::{BillingConfig, MembersConfig};
use crate::domain::membership::EntitlementPolicy;
use crate::ports::{BillingProvider, EventPublisher, MemberStore, OfferRepository, ProductRepository};

use super::handlers::{
    CancelComplimentaryHandler, CancelSubscriptionHandler, CreateMemberHandler,
    DestroyMemberHandler, GetSubscriptionHandler, LinkSubscriptionHandler, SetComplimentaryHandler,
    UpdateMemberHandler, UpdateSubscriptionHandler,
};

#[derive(Clone)]
pub struct MemberBillingServices {
    pub store: Arc<dyn MemberStore>,
    pub billing: Arc<dyn BillingProvider>,
    pub products: Arc<dyn ProductRepository>,
    pub offers: Arc<dyn OfferRepository>,
    pub event_publisher: Arc<dyn EventPublisher>,
    policy: EntitlementPolicy,
    billing_enabled: bool,
    complimentary_price_id: Option<String>,
}

impl MemberBillingServices {
    pub fn new(
        store: Arc<dyn MemberStore>,
        billing: Arc<dyn BillingProvider>,
        products: Arc<dyn ProductRepository>,
        offers: Arc<dyn OfferRepository>,
        event_publisher: Arc<dyn EventPublisher>,
        members: &MembersConfig,
        billing_config: &BillingConfig,
    ) -> Self {
        Self {
            store,
            billing,
            products,
            offers,
            event_publisher,
            policy: members.entitlement_policy,
            billing_enabled: billing_config.enabled,
            complimentary_price_id: billing_config.complimentary_price().map(str::to_string),
        }
    }

    pub fn policy(&self) -> EntitlementPolicy {
        self.policy
    }

    pub fn billing_enabled(&self) -> bool {
        self.billing_enabled
    }

    pub fn link_subscription_handler(&self) -> LinkSubscriptionHandler {
        LinkSubscriptionHandler::new(
            self.store.clone(),
            self.billing.clone(),
            self.products.clone(),
            self.offers.clone(),
            self.event_publisher.clone(),
            self.policy,
        )
    }

    pub fn set_complimentary_handler(&self) -> SetComplimentaryHandler {
        SetComplimentaryHandler::new(
            self.store.clone(),
            self.billing.clone(),
            Arc::new(self.link_subscription_handler()),
            self.complimentary_price_id.clone(),
        )
    }

    pub fn cancel_complimentary_handler(&self) -> CancelComplimentaryHandler {
        CancelComplimentaryHandler::new(
            self.store.clone(),
            self.billing.clone(),
            Arc::new(self.link_subscription_handler()),
        )
    }

    pub fn cancel_subscription_handler(&self) -> CancelSubscriptionHandler {
        CancelSubscriptionHandler::new(
            self.store.clone(),
            self.billing.clone(),
            Arc::new(self.link_subscription_handler()),
        )
    }

    pub fn update_subscription_handler(&self) -> UpdateSubscriptionHandler {
        UpdateSubscriptionHandler::new(
            self.store.clone(),
            self.billing.clone(),
            self.products.clone(),
            Arc::new(self.link_subscription_handler()),
        )
    }

    pub fn get_subscription_handler(&self) -> GetSubscriptionHandler {
        GetSubscriptionHandler::new(self.store.clone())
    }

    pub fn create_member_handler(&self) -> CreateMemberHandler {
        CreateMemberHandler::new(
            self.store.clone(),
            self.billing.clone(),
            self.products.clone(),
            Arc::new(self.link_subscription_handler()),
            Arc::new(self.set_complimentary_handler()),
            self.event_publisher.clone(),
            self.billing_enabled,
        )
    }

    pub fn update_member_handler(&self) -> UpdateMemberHandler {
        UpdateMemberHandler::new(
            self.store.clone(),
            self.billing.clone(),
            self.products.clone(),
            self.event_publisher.clone(),
            self.policy,
        )
    }

    pub fn destroy_member_handler(&self) -> DestroyMemberHandler {
        DestroyMemberHandler::new(
            self.store.clone(),
            self.billing.clone(),
            Arc::new(self.link_subscription_handler()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{
        InMemoryEventBus, InMemoryMemberStore, InMemoryOfferRepository, InMemoryProductRepository,
        MockBillingProvider,
    };
    use crate::application::handlers::{CreateMemberCommand, SetComplimentaryCommand};
    use crate::domain::foundation::EventSource;
    use crate::domain::membership::MembershipError;

    fn services(members: MembersConfig, billing: BillingConfig) -> MemberBillingServices {
        MemberBillingServices::new(
            Arc::new(InMemoryMemberStore::new()),
            Arc::new(MockBillingProvider::new()),
            Arc::new(InMemoryProductRepository::new()),
            Arc::new(InMemoryOfferRepository::new()),
            Arc::new(InMemoryEventBus::new()),
            &members,
            &billing,
        )
    }

    #[test]
    fn policy_and_billing_flag_come_from_config() {
        let svc = services(
            MembersConfig {
                entitlement_policy: EntitlementPolicy::Union,
            },
            BillingConfig::default(),
        );

        assert_eq!(svc.policy(), EntitlementPolicy::Union);
        assert!(!svc.billing_enabled());
        assert_eq!(svc.link_subscription_handler().policy(), EntitlementPolicy::Union);
    }

    #[tokio::test]
    async fn complimentary_price_is_ignored_while_billing_is_off() {
        let svc = services(
            MembersConfig::default(),
            BillingConfig {
                complimentary_price_id: Some("price_comp".to_string()),
                ..BillingConfig::default()
            },
        );
        let member = svc
            .create_member_handler()
            .handle(CreateMemberCommand::new("a@example.com", EventSource::Admin))
            .await
            .unwrap()
            .member;

        let err = svc
            .set_complimentary_handler()
            .handle(SetComplimentaryCommand {
                member_id: member.id,
                source: EventSource::Admin,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, MembershipError::BadRequest(_)));
    }
}
