//! Shared wiring for integration tests: in-memory store and catalog, the mock
//! billing provider and the in-process event bus.

#![allow(dead_code)]

use std::sync::Arc;

use tokio::task::JoinHandle;

use member_billing::adapters::{
    InMemoryEventBus, InMemoryMemberStore, InMemoryOfferRepository, InMemoryProductRepository,
    MockBillingProvider,
};
use member_billing::application::{
    CancelComplimentaryHandler, CancelSubscriptionHandler, CreateMemberHandler,
    DestroyMemberHandler, GetSubscriptionHandler, LinkSubscriptionCommand,
    LinkSubscriptionHandler, LinkSubscriptionResult, SetComplimentaryHandler,
    UpdateMemberHandler, UpdateSubscriptionHandler,
};
use member_billing::domain::billing::{
    PriceSnapshot, SubscriptionItem, SubscriptionSnapshot, SubscriptionStatus,
};
use member_billing::domain::foundation::EventSource;
use member_billing::domain::membership::{
    CustomerLink, EntitlementPolicy, Member, MembershipError, Product, ProductKind,
};
use member_billing::ports::{
    BillingProvider, EventPublisher, MemberStore, OfferRepository, ProductRepository,
};

pub const COMP_PRICE: &str = "price_comp";

pub struct Harness {
    pub store: InMemoryMemberStore,
    pub billing: MockBillingProvider,
    pub products: InMemoryProductRepository,
    pub offers: InMemoryOfferRepository,
    pub bus: Arc<InMemoryEventBus>,
    pub gold: Product,
    pub silver: Product,
    pub link: Arc<LinkSubscriptionHandler>,
    pub complimentary: Arc<SetComplimentaryHandler>,
    policy: EntitlementPolicy,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_policy(EntitlementPolicy::Replace).await
    }

    pub async fn with_policy(policy: EntitlementPolicy) -> Self {
        let store = InMemoryMemberStore::new();
        let billing = MockBillingProvider::new();
        let products = InMemoryProductRepository::new();
        let offers = InMemoryOfferRepository::new();
        let bus = Arc::new(InMemoryEventBus::new());

        let gold = Product::new("Gold", ProductKind::Paid)
            .with_external_product("prod_gold")
            .with_price("price_gold_month");
        let silver = Product::new("Silver", ProductKind::Paid)
            .with_external_product("prod_silver")
            .with_price("price_silver_month");
        products.insert(gold.clone()).await;
        products.insert(silver.clone()).await;

        billing.add_price(price("price_gold_month", "prod_gold", 500, "month"));
        billing.add_price(price("price_silver_month", "prod_silver", 300, "month"));
        billing.add_price(PriceSnapshot {
            nickname: Some("Complimentary".to_string()),
            ..price(COMP_PRICE, "prod_gold", 0, "year")
        });

        let link = Arc::new(LinkSubscriptionHandler::new(
            Arc::new(store.clone()),
            Arc::new(billing.clone()),
            Arc::new(products.clone()),
            Arc::new(offers.clone()),
            bus.clone(),
            policy,
        ));
        let complimentary = Arc::new(SetComplimentaryHandler::new(
            Arc::new(store.clone()),
            Arc::new(billing.clone()),
            link.clone(),
            Some(COMP_PRICE.to_string()),
        ));

        Self {
            store,
            billing,
            products,
            offers,
            bus,
            gold,
            silver,
            link,
            complimentary,
            policy,
        }
    }

    pub fn store_dyn(&self) -> Arc<dyn MemberStore> {
        Arc::new(self.store.clone())
    }

    pub fn billing_dyn(&self) -> Arc<dyn BillingProvider> {
        Arc::new(self.billing.clone())
    }

    pub fn products_dyn(&self) -> Arc<dyn ProductRepository> {
        Arc::new(self.products.clone())
    }

    pub fn offers_dyn(&self) -> Arc<dyn OfferRepository> {
        Arc::new(self.offers.clone())
    }

    pub fn bus_dyn(&self) -> Arc<dyn EventPublisher> {
        self.bus.clone()
    }

    pub fn create_member_handler(&self, billing_enabled: bool) -> CreateMemberHandler {
        CreateMemberHandler::new(
            self.store_dyn(),
            self.billing_dyn(),
            self.products_dyn(),
            self.link.clone(),
            self.complimentary.clone(),
            self.bus_dyn(),
            billing_enabled,
        )
    }

    pub fn update_member_handler(&self) -> UpdateMemberHandler {
        UpdateMemberHandler::new(
            self.store_dyn(),
            self.billing_dyn(),
            self.products_dyn(),
            self.bus_dyn(),
            self.policy,
        )
    }

    pub fn destroy_member_handler(&self) -> DestroyMemberHandler {
        DestroyMemberHandler::new(self.store_dyn(), self.billing_dyn(), self.link.clone())
    }

    pub fn cancel_subscription_handler(&self) -> CancelSubscriptionHandler {
        CancelSubscriptionHandler::new(self.store_dyn(), self.billing_dyn(), self.link.clone())
    }

    pub fn update_subscription_handler(&self) -> UpdateSubscriptionHandler {
        UpdateSubscriptionHandler::new(
            self.store_dyn(),
            self.billing_dyn(),
            self.products_dyn(),
            self.link.clone(),
        )
    }

    pub fn cancel_complimentary_handler(&self) -> CancelComplimentaryHandler {
        CancelComplimentaryHandler::new(self.store_dyn(), self.billing_dyn(), self.link.clone())
    }

    pub fn get_subscription_handler(&self) -> GetSubscriptionHandler {
        GetSubscriptionHandler::new(self.store_dyn())
    }

    /// A free member already linked to billing customer `customer_id`.
    pub async fn member_with_customer(&self, email: &str, customer_id: &str) -> Member {
        let member = Member::new(email, None).unwrap();
        self.store.seed_member(member.clone()).await;
        self.store
            .seed_customer(CustomerLink::new(
                customer_id,
                member.id,
                Some(member.email.clone()),
                None,
            ))
            .await;
        self.billing.add_customer(customer_id, Some(email));
        member
    }

    /// Publishes the snapshot at the provider, then reconciles it the way a
    /// webhook delivery would.
    pub async fn deliver(
        &self,
        member: &Member,
        snapshot: SubscriptionSnapshot,
    ) -> Result<LinkSubscriptionResult, MembershipError> {
        self.billing.add_subscription(snapshot.clone());
        self.link
            .handle(LinkSubscriptionCommand::new(member.id, snapshot, EventSource::System))
            .await
    }

    /// Same as [`Harness::deliver`], but on its own task so that concurrent
    /// deliveries run on separate runtime workers.
    pub fn spawn_deliver(
        &self,
        member: &Member,
        snapshot: SubscriptionSnapshot,
    ) -> JoinHandle<Result<LinkSubscriptionResult, MembershipError>> {
        let billing = self.billing.clone();
        let link = Arc::clone(&self.link);
        let member_id = member.id;
        tokio::spawn(async move {
            billing.add_subscription(snapshot.clone());
            link.handle(LinkSubscriptionCommand::new(member_id, snapshot, EventSource::System))
                .await
        })
    }

    pub fn event_types(&self) -> Vec<String> {
        self.bus.event_types()
    }

    pub fn count_of(&self, event_type: &str) -> usize {
        self.bus.events_of_type(event_type).len()
    }
}

pub fn price(id: &str, product_id: &str, amount: i64, interval: &str) -> PriceSnapshot {
    PriceSnapshot {
        id: id.to_string(),
        product_id: product_id.to_string(),
        nickname: None,
        unit_amount: amount,
        currency: "usd".to_string(),
        interval: interval.to_string(),
    }
}

pub fn snapshot(id: &str, customer_id: &str, price: PriceSnapshot) -> SubscriptionSnapshot {
    SubscriptionSnapshot {
        id: id.to_string(),
        customer_id: customer_id.to_string(),
        status: SubscriptionStatus::Active,
        cancel_at_period_end: false,
        cancellation_reason: None,
        start_date: 1_704_067_200,
        current_period_end: 1_706_745_600,
        trial_start: None,
        trial_end: None,
        items: vec![SubscriptionItem {
            id: format!("si_{}", id),
            price,
        }],
        discount: None,
        default_payment_method: None,
    }
}

pub fn gold_monthly(id: &str, customer_id: &str) -> SubscriptionSnapshot {
    snapshot(id, customer_id, price("price_gold_month", "prod_gold", 500, "month"))
}

pub fn silver_monthly(id: &str, customer_id: &str) -> SubscriptionSnapshot {
    snapshot(id, customer_id, price("price_silver_month", "prod_silver", 300, "month"))
}
