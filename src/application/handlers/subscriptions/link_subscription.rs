//! LinkSubscriptionHandler - reconciles a member with a billing subscription.
//!
//! This is the single code path that turns a provider snapshot into local
//! truth: the subscription row, the member's entitlements, the member's
//! status, and the events describing what changed. Every other subscription
//! operation mutates the provider first and then calls into here.
//!
//! Provider reads (fresh subscription state, card details) happen before the
//! member lock is taken. Everything from the lock to the commit runs in one
//! unit of work.

use std::sync::Arc;

use crate::application::event_emitter::{complete, EventEmitter};
use crate::domain::billing::{
    compute_mrr, PaymentMethod, PriceSnapshot, SubscriptionSnapshot, TransitionKind,
};
use crate::domain::foundation::{EventSource, MemberId, OfferId, ProductId};
use crate::domain::membership::{
    reconcile_entitlements, resolve_member_status, AccessGrant, Attribution, Degradation,
    DegradationKind, EntitlementInput, EntitlementPolicy, MemberEvent, MemberEventKind,
    MemberStatus, MembershipError, ProductDiff, ProductFilter, ProductPatch, ProductSelector,
    SubscriptionRecord,
};
use crate::ports::{
    BillingProvider, EventPublisher, MemberStore, MemberUnitOfWork, OfferRepository,
    ProductRepository, UpsertOutcome,
};

/// Command to reconcile one external subscription onto a member.
#[derive(Debug, Clone)]
pub struct LinkSubscriptionCommand {
    pub member_id: MemberId,
    pub snapshot: SubscriptionSnapshot,
    /// Offer to use when the snapshot carries no coupon (trial offers).
    pub offer_id: Option<OfferId>,
    pub attribution: Option<Attribution>,
    pub source: EventSource,
    /// Re-read the subscription from the provider before reconciling.
    pub refresh: bool,
}

impl LinkSubscriptionCommand {
    pub fn new(member_id: MemberId, snapshot: SubscriptionSnapshot, source: EventSource) -> Self {
        Self {
            member_id,
            snapshot,
            offer_id: None,
            attribution: None,
            source,
            refresh: true,
        }
    }

    pub fn with_offer(mut self, offer_id: OfferId) -> Self {
        self.offer_id = Some(offer_id);
        self
    }

    pub fn with_attribution(mut self, attribution: Attribution) -> Self {
        self.attribution = Some(attribution);
        self
    }

    /// Marks the snapshot as just returned by the provider; skips the re-read.
    pub fn fresh(mut self) -> Self {
        self.refresh = false;
        self
    }
}

/// Result of a reconciliation.
#[derive(Debug, Clone)]
pub struct LinkSubscriptionResult {
    pub subscription: SubscriptionRecord,
    pub member_status: MemberStatus,
    /// Entitlement changes that were persisted.
    pub product_changes: Vec<ProductDiff>,
    /// Events produced by this reconciliation, in dispatch order.
    pub events: Vec<MemberEvent>,
    pub degradations: Vec<Degradation>,
}

/// Provider data gathered before the member lock is taken.
#[derive(Debug, Clone)]
pub struct PreparedLink {
    pub snapshot: SubscriptionSnapshot,
    pub payment_method: Option<PaymentMethod>,
    pub degradations: Vec<Degradation>,
}

enum ProductMatch {
    Linked(ProductId),
    Default(ProductId),
    Missing,
}

/// Handler for reconciling subscriptions.
pub struct LinkSubscriptionHandler {
    store: Arc<dyn MemberStore>,
    billing: Arc<dyn BillingProvider>,
    products: Arc<dyn ProductRepository>,
    offers: Arc<dyn OfferRepository>,
    event_publisher: Arc<dyn EventPublisher>,
    policy: EntitlementPolicy,
}

impl LinkSubscriptionHandler {
    pub fn new(
        store: Arc<dyn MemberStore>,
        billing: Arc<dyn BillingProvider>,
        products: Arc<dyn ProductRepository>,
        offers: Arc<dyn OfferRepository>,
        event_publisher: Arc<dyn EventPublisher>,
        policy: EntitlementPolicy,
    ) -> Self {
        Self {
            store,
            billing,
            products,
            offers,
            event_publisher,
            policy,
        }
    }

    pub fn policy(&self) -> EntitlementPolicy {
        self.policy
    }

    /// Reconciles in its own unit of work and dispatches events after commit.
    pub async fn handle(
        &self,
        cmd: LinkSubscriptionCommand,
    ) -> Result<LinkSubscriptionResult, MembershipError> {
        let prepared = self.prepare(&cmd.snapshot, cmd.refresh).await;

        let mut uow = self.store.begin().await?;
        let mut emitter = EventEmitter::transactional(self.event_publisher.clone());

        let outcome = self
            .link_in(uow.as_mut(), &mut emitter, &cmd, prepared)
            .await;
        let (result, _) = complete(uow, &mut emitter, outcome).await?;

        if result.events.is_empty() {
            tracing::debug!(
                member_id = %cmd.member_id,
                subscription_id = %result.subscription.subscription_id,
                "Subscription reconciled with no changes"
            );
        } else {
            tracing::info!(
                member_id = %cmd.member_id,
                subscription_id = %result.subscription.subscription_id,
                status = %result.member_status,
                events = result.events.len(),
                "Subscription reconciled"
            );
        }

        Ok(result)
    }

    /// Fetches fresh provider state and card details. Never fails.
    pub async fn prepare(&self, snapshot: &SubscriptionSnapshot, refresh: bool) -> PreparedLink {
        let mut degradations = Vec::new();

        let snapshot = if refresh {
            match self.billing.get_subscription(&snapshot.id).await {
                Ok(latest) => latest,
                Err(e) => {
                    tracing::warn!(
                        subscription_id = %snapshot.id,
                        error = %e,
                        "Could not refresh subscription, reconciling supplied snapshot"
                    );
                    degradations.push(Degradation::new(
                        DegradationKind::SubscriptionRefresh,
                        e.to_string(),
                    ));
                    snapshot.clone()
                }
            }
        } else {
            snapshot.clone()
        };

        let payment_method = match snapshot.default_payment_method.as_deref() {
            Some(pm_id) => match self.billing.get_card_payment_method(pm_id).await {
                Ok(pm) => Some(pm),
                Err(e) => {
                    tracing::warn!(
                        subscription_id = %snapshot.id,
                        payment_method_id = pm_id,
                        error = %e,
                        "Could not fetch payment method"
                    );
                    degradations.push(Degradation::new(
                        DegradationKind::PaymentMethod,
                        e.to_string(),
                    ));
                    None
                }
            },
            None => None,
        };

        PreparedLink {
            snapshot,
            payment_method,
            degradations,
        }
    }

    /// Reconciles inside a caller-owned unit of work and emitter.
    ///
    /// The caller commits or rolls back; see [`complete`].
    pub async fn link_in(
        &self,
        uow: &mut dyn MemberUnitOfWork,
        emitter: &mut EventEmitter,
        cmd: &LinkSubscriptionCommand,
        prepared: PreparedLink,
    ) -> Result<LinkSubscriptionResult, MembershipError> {
        let PreparedLink {
            snapshot,
            payment_method,
            mut degradations,
        } = prepared;
        let mut events = Vec::new();

        let member = uow.lock_member(&cmd.member_id).await?;
        let status_before = member.status;

        let customer = uow.find_customer(&snapshot.customer_id).await?;
        if customer.map_or(true, |c| c.member_id != member.id) {
            return Err(MembershipError::not_found(format!(
                "No linked customer '{}' for member {}",
                snapshot.customer_id, member.id
            )));
        }

        let price = snapshot.price().ok_or_else(|| {
            MembershipError::bad_request(format!("Subscription '{}' has no price", snapshot.id))
        })?;

        let mrr = compute_mrr(
            &price.interval,
            price.unit_amount,
            snapshot.status,
            snapshot.cancel_at_period_end,
            snapshot.discount.as_ref(),
        )?;

        let product_id = self.resolve_product(price, &mut degradations).await;
        let offer_id = self.resolve_offer(&snapshot, cmd.offer_id).await?;

        // Subscription row
        let mut record = SubscriptionRecord::from_snapshot(
            member.id,
            &snapshot,
            price,
            product_id,
            offer_id,
            mrr,
            payment_method.as_ref(),
        );
        if let Some(existing) = uow.find_subscription(&snapshot.id).await? {
            if existing.member_id != member.id {
                return Err(MembershipError::conflict(format!(
                    "Subscription '{}' belongs to another member",
                    snapshot.id
                )));
            }
            record = record.merged_with(&existing);
        }

        let previous = match uow.upsert_subscription(&record).await? {
            UpsertOutcome::Inserted => {
                let event = MemberEvent::new(
                    member.id,
                    cmd.source,
                    MemberEventKind::SubscriptionCreated {
                        subscription_id: record.subscription_id.clone(),
                        record_id: record.id,
                        product_id: record.product_id,
                        offer_id: record.offer_id,
                        mrr_delta: record.mrr,
                        attribution: cmd.attribution.clone(),
                    },
                )
                .occurred(record.start_date);
                events.push(event);
                None
            }
            UpsertOutcome::Updated { previous } => {
                if record.differs_materially(&previous) {
                    let transition = TransitionKind::classify(previous.label(), record.label());
                    events.push(MemberEvent::new(
                        member.id,
                        cmd.source,
                        MemberEventKind::SubscriptionLifecycle {
                            subscription_id: record.subscription_id.clone(),
                            record_id: record.id,
                            transition,
                            mrr_delta: record.mrr - previous.mrr,
                        },
                    ));
                    if transition == TransitionKind::Canceled {
                        events.push(MemberEvent::new(
                            member.id,
                            cmd.source,
                            MemberEventKind::SubscriptionCancelled {
                                subscription_id: record.subscription_id.clone(),
                                record_id: record.id,
                                cancellation_reason: record.cancellation_reason.clone(),
                            },
                        ));
                    }
                }
                Some(previous)
            }
        };

        // Entitlements and status
        let current = uow.member_products(&member.id).await?;
        let others: Vec<SubscriptionRecord> = uow
            .subscriptions_for_member(&member.id)
            .await?
            .into_iter()
            .filter(|s| s.subscription_id != record.subscription_id)
            .collect();
        let other_active_products: Vec<ProductId> = others
            .iter()
            .filter(|s| s.grants_access())
            .filter_map(|s| s.product_id)
            .collect();

        let plan = reconcile_entitlements(
            EntitlementInput {
                current: &current,
                previous_product: previous.as_ref().and_then(|p| p.product_id),
                new_product: record.product_id,
                grants_access: record.grants_access(),
                other_active_products: &other_active_products,
            },
            self.policy,
        );

        let other_grants: Vec<AccessGrant> = others.iter().map(AccessGrant::of).collect();
        let status = resolve_member_status(
            Some(AccessGrant::of(&record)),
            &other_grants,
            plan.next.len(),
        );

        let mut product_changes = Vec::new();
        if !plan.is_unchanged() {
            match uow
                .save_member_state(&member.id, status, Some(&plan.next))
                .await
            {
                Ok(()) => product_changes = plan.diff.clone(),
                Err(e) => {
                    tracing::warn!(
                        member_id = %member.id,
                        subscription_id = %record.subscription_id,
                        error = %e,
                        "Entitlement write failed, storing status only"
                    );
                    degradations.push(Degradation::new(
                        DegradationKind::EntitlementWrite,
                        e.to_string(),
                    ));
                    uow.save_member_state(&member.id, status, None).await?;
                }
            }
        } else if status != status_before {
            uow.save_member_state(&member.id, status, None).await?;
        }

        for diff in &product_changes {
            events.push(MemberEvent::product_changed(
                member.id,
                cmd.source,
                diff.product_id,
                diff.change,
            ));
        }

        if status != status_before {
            events.push(MemberEvent::status_changed(
                member.id,
                cmd.source,
                status_before,
                status,
            ));
        }

        for event in &events {
            emitter.emit(event.clone()).await;
        }

        Ok(LinkSubscriptionResult {
            subscription: record,
            member_status: status,
            product_changes,
            events,
            degradations,
        })
    }

    /// Finds the product for a price. Failures degrade instead of aborting.
    async fn resolve_product(
        &self,
        price: &PriceSnapshot,
        degradations: &mut Vec<Degradation>,
    ) -> Option<ProductId> {
        match self.lookup_product(price).await {
            Ok(ProductMatch::Linked(id)) => Some(id),
            Ok(ProductMatch::Default(id)) => {
                tracing::warn!(
                    price_id = %price.id,
                    product_id = %id,
                    "Price matched no product, using default paid product"
                );
                degradations.push(Degradation::new(
                    DegradationKind::ProductLink,
                    format!("Price '{}' matched no product; used default {}", price.id, id),
                ));
                Some(id)
            }
            Ok(ProductMatch::Missing) => {
                tracing::warn!(price_id = %price.id, "Price matched no product and no default exists");
                degradations.push(Degradation::new(
                    DegradationKind::ProductLink,
                    format!("No product found for price '{}'", price.id),
                ));
                None
            }
            Err(e) => {
                tracing::warn!(price_id = %price.id, error = %e, "Product lookup failed");
                degradations.push(Degradation::new(DegradationKind::ProductLink, e.to_string()));
                None
            }
        }
    }

    async fn lookup_product(&self, price: &PriceSnapshot) -> Result<ProductMatch, MembershipError> {
        let by_price = ProductSelector::ByExternalPriceId(price.id.clone());
        if let Some(product) = self.products.get(&by_price).await? {
            return Ok(ProductMatch::Linked(product.id));
        }

        let by_product = ProductSelector::ByExternalProductId(price.product_id.clone());
        if let Some(product) = self.products.get(&by_product).await? {
            if let Err(e) = self
                .products
                .update(&ProductPatch::link_price(product.id, price.id.clone()))
                .await
            {
                tracing::warn!(
                    product_id = %product.id,
                    price_id = %price.id,
                    error = %e,
                    "Could not link price to product"
                );
            }
            return Ok(ProductMatch::Linked(product.id));
        }

        let fallback = self
            .products
            .list(&ProductFilter::active_paid())
            .await?
            .into_iter()
            .next();
        Ok(match fallback {
            Some(product) => ProductMatch::Default(product.id),
            None => ProductMatch::Missing,
        })
    }

    /// Coupon match first, then the explicitly supplied offer.
    async fn resolve_offer(
        &self,
        snapshot: &SubscriptionSnapshot,
        explicit: Option<OfferId>,
    ) -> Result<Option<OfferId>, MembershipError> {
        if let Some(coupon_id) = snapshot.coupon_id() {
            if let Some(offer) = self.offers.get_by_external_coupon_id(coupon_id).await? {
                return Ok(Some(offer.id));
            }
        }

        if let Some(offer_id) = explicit {
            if self.offers.get_by_id(&offer_id).await?.is_some() {
                return Ok(Some(offer_id));
            }
            tracing::warn!(offer_id = %offer_id, "Supplied offer does not exist, ignoring");
        }

        Ok(None)
    }
}
