//! UpdateMemberHandler - Command handler for editing members.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::application::event_emitter::{complete, EventEmitter};
use crate::domain::foundation::{EventSource, MemberId, NewsletterId, ProductId};
use crate::domain::membership::{
    diff_sets, normalize_email, resolve_member_status, AccessGrant, Degradation, DegradationKind,
    EntitlementPolicy, Member, MemberEvent, MembershipError,
};
use crate::ports::{BillingProvider, EventPublisher, MemberStore, MemberUnitOfWork, ProductRepository};

use super::product_grants::validate_product_grants;

/// Command to update a member. `None` fields are left unchanged.
#[derive(Debug, Clone)]
pub struct UpdateMemberCommand {
    pub member_id: MemberId,
    pub email: Option<String>,
    pub name: Option<String>,
    /// Full set of newsletters the member should be subscribed to.
    pub newsletters: Option<Vec<NewsletterId>>,
    /// Full set of directly granted products.
    pub products: Option<Vec<ProductId>>,
    pub source: EventSource,
}

impl UpdateMemberCommand {
    pub fn new(member_id: MemberId, source: EventSource) -> Self {
        Self {
            member_id,
            email: None,
            name: None,
            newsletters: None,
            products: None,
            source,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UpdateMemberResult {
    pub member: Member,
    pub events: Vec<MemberEvent>,
    pub degradations: Vec<Degradation>,
}

/// Handler for updating members.
pub struct UpdateMemberHandler {
    store: Arc<dyn MemberStore>,
    billing: Arc<dyn BillingProvider>,
    products: Arc<dyn ProductRepository>,
    event_publisher: Arc<dyn EventPublisher>,
    policy: EntitlementPolicy,
}

struct Updated {
    member: Member,
    /// Billing customers whose email must follow the member's.
    email_sync: Vec<String>,
}

impl UpdateMemberHandler {
    pub fn new(
        store: Arc<dyn MemberStore>,
        billing: Arc<dyn BillingProvider>,
        products: Arc<dyn ProductRepository>,
        event_publisher: Arc<dyn EventPublisher>,
        policy: EntitlementPolicy,
    ) -> Self {
        Self {
            store,
            billing,
            products,
            event_publisher,
            policy,
        }
    }

    pub async fn handle(
        &self,
        cmd: UpdateMemberCommand,
    ) -> Result<UpdateMemberResult, MembershipError> {
        let email = cmd.email.as_deref().map(normalize_email).transpose()?;
        let products = match &cmd.products {
            Some(requested) => Some(
                validate_product_grants(self.products.as_ref(), requested, self.policy).await?,
            ),
            None => None,
        };

        let mut uow = self.store.begin().await?;
        let mut emitter = EventEmitter::transactional(self.event_publisher.clone());
        let outcome = self
            .update_in(uow.as_mut(), &mut emitter, &cmd, email, products)
            .await;
        let (updated, events) = complete(uow, &mut emitter, outcome).await?;

        let mut degradations = Vec::new();
        for customer_id in &updated.email_sync {
            if let Err(e) = self
                .billing
                .update_customer_email(customer_id, &updated.member.email)
                .await
            {
                tracing::warn!(
                    member_id = %updated.member.id,
                    customer_id = %customer_id,
                    error = %e,
                    "Could not sync email to billing customer"
                );
                degradations.push(Degradation::new(DegradationKind::EmailSync, e.to_string()));
            }
        }

        tracing::info!(member_id = %updated.member.id, events = events.len(), "Member updated");

        Ok(UpdateMemberResult {
            member: updated.member,
            events,
            degradations,
        })
    }

    async fn update_in(
        &self,
        uow: &mut dyn MemberUnitOfWork,
        emitter: &mut EventEmitter,
        cmd: &UpdateMemberCommand,
        email: Option<String>,
        products: Option<Vec<ProductId>>,
    ) -> Result<Updated, MembershipError> {
        let mut member = uow.lock_member(&cmd.member_id).await?;
        let mut email_sync = Vec::new();

        if let Some(email) = email.filter(|e| *e != member.email) {
            if let Some(other) = uow.find_member_by_email(&email).await? {
                if other.id != member.id {
                    return Err(MembershipError::bad_request("Email is already in use"));
                }
            }
            emitter
                .emit(MemberEvent::email_changed(member.id, cmd.source, &member.email, &email))
                .await;
            for link in uow.customers_for_member(&member.id).await? {
                uow.update_customer_email(&link.customer_id, &email).await?;
                email_sync.push(link.customer_id);
            }
            member.email = email;
        }

        if let Some(name) = &cmd.name {
            member.name = Some(name.clone()).filter(|n| !n.trim().is_empty());
        }

        if let Some(newsletters) = &cmd.newsletters {
            let next: BTreeSet<NewsletterId> = newsletters.iter().copied().collect();
            for removed in member.newsletters.difference(&next) {
                emitter
                    .emit(MemberEvent::newsletter(member.id, cmd.source, *removed, false))
                    .await;
            }
            for added in next.difference(&member.newsletters) {
                emitter
                    .emit(MemberEvent::newsletter(member.id, cmd.source, *added, true))
                    .await;
            }
            member.newsletters = next;
        }

        member.touch();
        uow.update_member(&member).await?;

        if let Some(requested) = products {
            let current = uow.member_products(&member.id).await?;
            let subscriptions = uow.subscriptions_for_member(&member.id).await?;

            let adds_products = requested.iter().any(|p| !current.contains(p));
            let has_paid = subscriptions
                .iter()
                .any(|s| s.grants_access() && !s.is_complimentary());
            if adds_products && has_paid {
                return Err(MembershipError::bad_request(
                    "Cannot add products to a member with an active paid subscription",
                ));
            }

            let diff = diff_sets(&current, &requested);
            let grants: Vec<AccessGrant> = subscriptions.iter().map(AccessGrant::of).collect();
            let status = resolve_member_status(None, &grants, requested.len());

            if !diff.is_empty() || status != member.status {
                uow.save_member_state(&member.id, status, Some(&requested))
                    .await?;
            }
            for entry in &diff {
                emitter
                    .emit(MemberEvent::product_changed(
                        member.id,
                        cmd.source,
                        entry.product_id,
                        entry.change,
                    ))
                    .await;
            }
            if status != member.status {
                emitter
                    .emit(MemberEvent::status_changed(member.id, cmd.source, member.status, status))
                    .await;
                member.status = status;
            }
        }

        Ok(Updated { member, email_sync })
    }
}
