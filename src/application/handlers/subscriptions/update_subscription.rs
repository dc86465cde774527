//! UpdateSubscriptionHandler - plan changes and scheduled cancellation.

use std::sync::Arc;

use crate::domain::foundation::{EventSource, MemberId};
use crate::domain::membership::{MembershipError, ProductSelector};
use crate::ports::{BillingProvider, MemberStore, ProductRepository};

use super::{LinkSubscriptionCommand, LinkSubscriptionHandler, LinkSubscriptionResult};

/// Command to change a subscription's price and/or cancellation flag.
#[derive(Debug, Clone)]
pub struct UpdateSubscriptionCommand {
    pub member_id: MemberId,
    /// External subscription id.
    pub subscription_id: String,
    /// New provider price for the first subscription item.
    pub price_id: Option<String>,
    /// `Some(true)` schedules cancellation, `Some(false)` undoes it.
    pub cancel_at_period_end: Option<bool>,
    pub cancellation_reason: Option<String>,
    pub source: EventSource,
}

/// Handler for updating subscriptions.
pub struct UpdateSubscriptionHandler {
    store: Arc<dyn MemberStore>,
    billing: Arc<dyn BillingProvider>,
    products: Arc<dyn ProductRepository>,
    link: Arc<LinkSubscriptionHandler>,
}

impl UpdateSubscriptionHandler {
    pub fn new(
        store: Arc<dyn MemberStore>,
        billing: Arc<dyn BillingProvider>,
        products: Arc<dyn ProductRepository>,
        link: Arc<LinkSubscriptionHandler>,
    ) -> Self {
        Self {
            store,
            billing,
            products,
            link,
        }
    }

    pub async fn handle(
        &self,
        cmd: UpdateSubscriptionCommand,
    ) -> Result<LinkSubscriptionResult, MembershipError> {
        if cmd.price_id.is_none() && cmd.cancel_at_period_end.is_none() {
            return Err(MembershipError::bad_request(
                "Nothing to update: supply a price or a cancellation flag",
            ));
        }

        let record = self
            .store
            .find_subscription_by_external_id(&cmd.subscription_id)
            .await?
            .filter(|r| r.member_id == cmd.member_id)
            .ok_or_else(|| {
                MembershipError::not_found(format!(
                    "Subscription '{}' not found for member {}",
                    cmd.subscription_id, cmd.member_id
                ))
            })?;

        let mut snapshot = None;

        if let Some(price_id) = &cmd.price_id {
            let product = self
                .products
                .get(&ProductSelector::ByExternalPriceId(price_id.clone()))
                .await?
                .ok_or_else(|| {
                    MembershipError::not_found(format!("No product for price '{}'", price_id))
                })?;
            if !product.active {
                return Err(MembershipError::bad_request(format!(
                    "Cannot move to archived product '{}'",
                    product.name
                )));
            }

            let current = self.billing.get_subscription(&record.subscription_id).await?;
            let item = current.primary_item().ok_or_else(|| {
                MembershipError::bad_request(format!(
                    "Subscription '{}' has no items",
                    record.subscription_id
                ))
            })?;

            snapshot = Some(
                self.billing
                    .update_subscription_item_price(&record.subscription_id, &item.id, price_id)
                    .await?,
            );
        }

        match cmd.cancel_at_period_end {
            Some(true) => {
                snapshot = Some(
                    self.billing
                        .cancel_subscription_at_period_end(
                            &record.subscription_id,
                            cmd.cancellation_reason.as_deref(),
                        )
                        .await?,
                );
            }
            Some(false) => {
                snapshot = Some(
                    self.billing
                        .continue_subscription_at_period_end(&record.subscription_id)
                        .await?,
                );
            }
            None => {}
        }

        let snapshot = snapshot.ok_or_else(|| MembershipError::bad_request("Nothing to update"))?;

        self.link
            .handle(LinkSubscriptionCommand::new(cmd.member_id, snapshot, cmd.source).fresh())
            .await
    }
}
