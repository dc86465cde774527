//! CancelSubscriptionHandler - immediate cancellation of a member's subscription.

use std::sync::Arc;

use crate::domain::foundation::{EventSource, MemberId};
use crate::domain::membership::MembershipError;
use crate::ports::{BillingProvider, MemberStore};

use super::{LinkSubscriptionCommand, LinkSubscriptionHandler, LinkSubscriptionResult};

/// Command to cancel a subscription right away.
#[derive(Debug, Clone)]
pub struct CancelSubscriptionCommand {
    pub member_id: MemberId,
    /// External subscription id.
    pub subscription_id: String,
    pub source: EventSource,
}

/// Handler for cancelling subscriptions.
///
/// The provider is told first; the returned snapshot is then reconciled.
pub struct CancelSubscriptionHandler {
    store: Arc<dyn MemberStore>,
    billing: Arc<dyn BillingProvider>,
    link: Arc<LinkSubscriptionHandler>,
}

impl CancelSubscriptionHandler {
    pub fn new(
        store: Arc<dyn MemberStore>,
        billing: Arc<dyn BillingProvider>,
        link: Arc<LinkSubscriptionHandler>,
    ) -> Self {
        Self {
            store,
            billing,
            link,
        }
    }

    pub async fn handle(
        &self,
        cmd: CancelSubscriptionCommand,
    ) -> Result<LinkSubscriptionResult, MembershipError> {
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

        let snapshot = self.billing.cancel_subscription(&record.subscription_id).await?;

        tracing::info!(
            member_id = %cmd.member_id,
            subscription_id = %record.subscription_id,
            "Subscription cancelled at provider"
        );

        self.link
            .handle(LinkSubscriptionCommand::new(cmd.member_id, snapshot, cmd.source).fresh())
            .await
    }
}
