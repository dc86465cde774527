//! CreateMemberHandler - Command handler for creating members.
//!
//! A member may be created bare, with directly granted products, linked to
//! an existing billing customer (whose subscriptions are reconciled in the
//! same unit of work), or with complimentary access.

use std::sync::Arc;

use crate::application::event_emitter::{complete, EventEmitter};
use crate::application::handlers::subscriptions::{
    LinkSubscriptionCommand, LinkSubscriptionHandler, LinkSubscriptionResult, PreparedLink,
    SetComplimentaryCommand, SetComplimentaryHandler,
};
use crate::domain::foundation::{EventSource, NewsletterId, OfferId, ProductId};
use crate::domain::membership::{
    normalize_email, Attribution, CustomerLink, Member, MemberEvent, MemberStatus,
    MembershipError, ProductChange,
};
use crate::ports::{
    BillingProvider, Customer, EventPublisher, MemberStore, MemberUnitOfWork, ProductRepository,
};

use super::product_grants::validate_product_grants;

/// Command to create a member.
#[derive(Debug, Clone)]
pub struct CreateMemberCommand {
    pub email: String,
    pub name: Option<String>,
    pub newsletters: Vec<NewsletterId>,
    /// Products granted directly; the member becomes comped.
    pub products: Vec<ProductId>,
    /// Give complimentary access through the billing provider after creation.
    pub comped: bool,
    /// Existing billing customer to link, with all its subscriptions.
    pub stripe_customer_id: Option<String>,
    pub offer_id: Option<OfferId>,
    pub attribution: Option<Attribution>,
    pub source: EventSource,
}

impl CreateMemberCommand {
    pub fn new(email: impl Into<String>, source: EventSource) -> Self {
        Self {
            email: email.into(),
            name: None,
            newsletters: Vec::new(),
            products: Vec::new(),
            comped: false,
            stripe_customer_id: None,
            offer_id: None,
            attribution: None,
            source,
        }
    }
}

/// Result of successful member creation.
#[derive(Debug, Clone)]
pub struct CreateMemberResult {
    pub member: Member,
    /// Reconciliations of the linked customer's subscriptions and of any
    /// complimentary subscription.
    pub subscriptions: Vec<LinkSubscriptionResult>,
    /// Events dispatched by the creating unit of work.
    pub events: Vec<MemberEvent>,
}

/// Handler for creating members.
pub struct CreateMemberHandler {
    store: Arc<dyn MemberStore>,
    billing: Arc<dyn BillingProvider>,
    products: Arc<dyn ProductRepository>,
    link: Arc<LinkSubscriptionHandler>,
    complimentary: Arc<SetComplimentaryHandler>,
    event_publisher: Arc<dyn EventPublisher>,
    billing_enabled: bool,
}

impl CreateMemberHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn MemberStore>,
        billing: Arc<dyn BillingProvider>,
        products: Arc<dyn ProductRepository>,
        link: Arc<LinkSubscriptionHandler>,
        complimentary: Arc<SetComplimentaryHandler>,
        event_publisher: Arc<dyn EventPublisher>,
        billing_enabled: bool,
    ) -> Self {
        Self {
            store,
            billing,
            products,
            link,
            complimentary,
            event_publisher,
            billing_enabled,
        }
    }

    pub async fn handle(
        &self,
        cmd: CreateMemberCommand,
    ) -> Result<CreateMemberResult, MembershipError> {
        let email = normalize_email(&cmd.email)?;
        let products =
            validate_product_grants(self.products.as_ref(), &cmd.products, self.link.policy())
                .await?;

        // Provider reads happen before the transaction starts.
        let customer = match &cmd.stripe_customer_id {
            Some(_) if !self.billing_enabled => {
                return Err(MembershipError::bad_request(
                    "Billing is not configured; cannot link a billing customer",
                ));
            }
            Some(customer_id) => Some(self.billing.get_customer(customer_id).await?),
            None => None,
        };
        let mut prepared = Vec::new();
        if let Some(customer) = &customer {
            for snapshot in &customer.subscriptions {
                prepared.push(self.link.prepare(snapshot, false).await);
            }
        }

        let mut uow = self.store.begin().await?;
        let mut emitter = EventEmitter::transactional(self.event_publisher.clone());
        let outcome = self
            .create_in(
                uow.as_mut(),
                &mut emitter,
                &cmd,
                email,
                &products,
                customer.as_ref(),
                prepared,
            )
            .await;
        let ((mut member, mut subscriptions), events) =
            complete(uow, &mut emitter, outcome).await?;

        tracing::info!(
            member_id = %member.id,
            status = %member.status,
            source = %cmd.source,
            "Member created"
        );

        if cmd.comped {
            let comped = self
                .complimentary
                .handle(SetComplimentaryCommand {
                    member_id: member.id,
                    source: cmd.source,
                })
                .await?;
            subscriptions.extend(comped);
            if let Some(latest) = self.store.find_member(&member.id).await? {
                member = latest;
            }
        }

        Ok(CreateMemberResult {
            member,
            subscriptions,
            events,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn create_in(
        &self,
        uow: &mut dyn MemberUnitOfWork,
        emitter: &mut EventEmitter,
        cmd: &CreateMemberCommand,
        email: String,
        products: &[ProductId],
        customer: Option<&Customer>,
        prepared: Vec<PreparedLink>,
    ) -> Result<(Member, Vec<LinkSubscriptionResult>), MembershipError> {
        if uow.find_member_by_email(&email).await?.is_some() {
            return Err(MembershipError::bad_request("Member already exists"));
        }

        let mut member = Member::new(&email, cmd.name.clone())?;
        member.newsletters = cmd.newsletters.iter().copied().collect();
        uow.insert_member(&member).await?;

        emitter
            .emit(MemberEvent::created(member.id, cmd.source, &member.email, member.status))
            .await;
        for newsletter in &member.newsletters {
            emitter
                .emit(MemberEvent::newsletter(member.id, cmd.source, *newsletter, true))
                .await;
        }

        if !products.is_empty() {
            uow.save_member_state(&member.id, MemberStatus::Comped, Some(products))
                .await?;
            for product in products {
                emitter
                    .emit(MemberEvent::product_changed(
                        member.id,
                        cmd.source,
                        *product,
                        ProductChange::Added,
                    ))
                    .await;
            }
            emitter
                .emit(MemberEvent::status_changed(
                    member.id,
                    cmd.source,
                    member.status,
                    MemberStatus::Comped,
                ))
                .await;
        }

        let mut linked = Vec::new();
        if let Some(customer) = customer {
            uow.insert_customer(&CustomerLink::new(
                customer.id.clone(),
                member.id,
                customer.email.clone(),
                customer.name.clone(),
            ))
            .await?;

            for prepared in prepared {
                let mut link = LinkSubscriptionCommand::new(
                    member.id,
                    prepared.snapshot.clone(),
                    cmd.source,
                )
                .fresh();
                link.offer_id = cmd.offer_id;
                link.attribution = cmd.attribution.clone();
                linked.push(self.link.link_in(uow, emitter, &link, prepared).await?);
            }
        }

        let member = uow.lock_member(&member.id).await?;
        Ok((member, linked))
    }
}
