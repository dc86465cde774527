//! CancelComplimentaryHandler - ends a member's complimentary access.

use std::sync::Arc;

use crate::domain::foundation::{EventSource, MemberId};
use crate::domain::membership::MembershipError;
use crate::ports::{BillingProvider, MemberStore};

use super::{LinkSubscriptionCommand, LinkSubscriptionHandler, LinkSubscriptionResult};

#[derive(Debug, Clone)]
pub struct CancelComplimentaryCommand {
    pub member_id: MemberId,
    pub source: EventSource,
}

/// Cancels every active complimentary subscription of a member.
pub struct CancelComplimentaryHandler {
    store: Arc<dyn MemberStore>,
    billing: Arc<dyn BillingProvider>,
    link: Arc<LinkSubscriptionHandler>,
}

impl CancelComplimentaryHandler {
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
        cmd: CancelComplimentaryCommand,
    ) -> Result<Vec<LinkSubscriptionResult>, MembershipError> {
        if self.store.find_member(&cmd.member_id).await?.is_none() {
            return Err(MembershipError::not_found(format!(
                "Member {} not found",
                cmd.member_id
            )));
        }

        let complimentary: Vec<_> = self
            .store
            .subscriptions_for_member(&cmd.member_id)
            .await?
            .into_iter()
            .filter(|s| s.grants_access() && s.is_complimentary())
            .collect();

        let mut results = Vec::with_capacity(complimentary.len());
        for record in complimentary {
            let snapshot = self.billing.cancel_subscription(&record.subscription_id).await?;
            let link = LinkSubscriptionCommand::new(cmd.member_id, snapshot, cmd.source).fresh();
            results.push(self.link.handle(link).await?);
        }

        Ok(results)
    }
}
