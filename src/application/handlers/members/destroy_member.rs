//! DestroyMemberHandler - Command handler for deleting members.

use std::sync::Arc;

use crate::domain::foundation::{EventSource, MemberId};
use crate::domain::membership::MembershipError;
use crate::ports::{BillingProvider, MemberStore};

use crate::application::handlers::subscriptions::{
    LinkSubscriptionCommand, LinkSubscriptionHandler, LinkSubscriptionResult,
};

#[derive(Debug, Clone)]
pub struct DestroyMemberCommand {
    pub member_id: MemberId,
    /// Cancel active subscriptions at the provider before deleting.
    pub cancel_subscriptions: bool,
    pub source: EventSource,
}

#[derive(Debug, Clone)]
pub struct DestroyMemberResult {
    pub member_id: MemberId,
    pub cancelled: Vec<LinkSubscriptionResult>,
}

/// Handler for deleting members.
///
/// Deletion cascades to customers, subscriptions, entitlements and
/// newsletter subscriptions.
pub struct DestroyMemberHandler {
    store: Arc<dyn MemberStore>,
    billing: Arc<dyn BillingProvider>,
    link: Arc<LinkSubscriptionHandler>,
}

impl DestroyMemberHandler {
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
        cmd: DestroyMemberCommand,
    ) -> Result<DestroyMemberResult, MembershipError> {
        if self.store.find_member(&cmd.member_id).await?.is_none() {
            return Err(MembershipError::not_found(format!(
                "Member {} not found",
                cmd.member_id
            )));
        }

        let mut cancelled = Vec::new();
        if cmd.cancel_subscriptions {
            let active = self
                .store
                .subscriptions_for_member(&cmd.member_id)
                .await?
                .into_iter()
                .filter(|s| s.grants_access());
            for record in active {
                let snapshot = self.billing.cancel_subscription(&record.subscription_id).await?;
                let link = LinkSubscriptionCommand::new(cmd.member_id, snapshot, cmd.source).fresh();
                cancelled.push(self.link.handle(link).await?);
            }
        }

        let mut uow = self.store.begin().await?;
        let deleted = async {
            uow.lock_member(&cmd.member_id).await?;
            uow.delete_member(&cmd.member_id).await
        }
        .await;
        match deleted {
            Ok(()) => uow.commit().await?,
            Err(e) => {
                uow.rollback().await?;
                return Err(e.into());
            }
        }

        tracing::info!(
            member_id = %cmd.member_id,
            cancelled = cancelled.len(),
            "Member deleted"
        );

        Ok(DestroyMemberResult {
            member_id: cmd.member_id,
            cancelled,
        })
    }
}
