//! SetComplimentaryHandler - moves a member onto the complimentary plan.
//!
//! Complimentary access is a real provider subscription on a zero-price
//! "Complimentary" price, so it flows through the same reconciliation as
//! paid subscriptions.

use std::sync::Arc;

use crate::domain::foundation::{EventSource, MemberId};
use crate::domain::membership::{CustomerLink, Member, MembershipError};
use crate::ports::{BillingProvider, CreateCustomerRequest, MemberStore};

use super::{LinkSubscriptionCommand, LinkSubscriptionHandler, LinkSubscriptionResult};

/// Command to give a member complimentary access.
#[derive(Debug, Clone)]
pub struct SetComplimentaryCommand {
    pub member_id: MemberId,
    pub source: EventSource,
}

/// Handler for setting complimentary subscriptions.
pub struct SetComplimentaryHandler {
    store: Arc<dyn MemberStore>,
    billing: Arc<dyn BillingProvider>,
    link: Arc<LinkSubscriptionHandler>,
    /// `None` when billing is disabled or no complimentary price is configured.
    complimentary_price_id: Option<String>,
}

impl SetComplimentaryHandler {
    pub fn new(
        store: Arc<dyn MemberStore>,
        billing: Arc<dyn BillingProvider>,
        link: Arc<LinkSubscriptionHandler>,
        complimentary_price_id: Option<String>,
    ) -> Self {
        Self {
            store,
            billing,
            link,
            complimentary_price_id,
        }
    }

    /// Returns one reconciliation result per subscription touched.
    pub async fn handle(
        &self,
        cmd: SetComplimentaryCommand,
    ) -> Result<Vec<LinkSubscriptionResult>, MembershipError> {
        let price_id = self.complimentary_price_id.as_deref().ok_or_else(|| {
            MembershipError::bad_request("Complimentary subscriptions require billing to be configured")
        })?;

        let member = self
            .store
            .find_member(&cmd.member_id)
            .await?
            .ok_or_else(|| MembershipError::not_found(format!("Member {} not found", cmd.member_id)))?;

        let customer_id = self.ensure_customer(&member).await?;

        let active: Vec<_> = self
            .store
            .subscriptions_for_member(&member.id)
            .await?
            .into_iter()
            .filter(|s| s.grants_access())
            .collect();

        let mut snapshots = Vec::new();
        if active.is_empty() {
            snapshots.push(self.billing.create_subscription(&customer_id, price_id).await?);
        } else {
            for record in active.iter().filter(|r| !r.is_complimentary()) {
                let current = self.billing.get_subscription(&record.subscription_id).await?;
                let item = current.primary_item().ok_or_else(|| {
                    MembershipError::bad_request(format!(
                        "Subscription '{}' has no items",
                        record.subscription_id
                    ))
                })?;
                snapshots.push(
                    self.billing
                        .update_subscription_item_price(&record.subscription_id, &item.id, price_id)
                        .await?,
                );
            }
        }

        let mut results = Vec::with_capacity(snapshots.len());
        for snapshot in snapshots {
            let cmd = LinkSubscriptionCommand::new(member.id, snapshot, cmd.source).fresh();
            results.push(self.link.handle(cmd).await?);
        }

        tracing::info!(
            member_id = %member.id,
            subscriptions = results.len(),
            "Complimentary access set"
        );

        Ok(results)
    }

    /// Returns the member's billing customer, creating and linking one if needed.
    async fn ensure_customer(&self, member: &Member) -> Result<String, MembershipError> {
        if let Some(link) = self.store.customers_for_member(&member.id).await?.into_iter().next() {
            return Ok(link.customer_id);
        }

        let customer = self
            .billing
            .create_customer(CreateCustomerRequest {
                email: member.email.clone(),
                name: member.name.clone(),
                member_id: member.id.to_string(),
            })
            .await?;

        let mut uow = self.store.begin().await?;
        let linked = async {
            uow.lock_member(&member.id).await?;
            uow.insert_customer(&CustomerLink::new(
                customer.id.clone(),
                member.id,
                customer.email.clone(),
                customer.name.clone(),
            ))
            .await
        }
        .await;

        match linked {
            Ok(()) => uow.commit().await?,
            Err(e) => {
                uow.rollback().await?;
                return Err(e.into());
            }
        }

        tracing::info!(member_id = %member.id, customer_id = %customer.id, "Billing customer created");
        Ok(customer.id)
    }
}
