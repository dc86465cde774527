//! GetSubscriptionHandler - Query handler for subscription records.

use std::sync::Arc;

use crate::domain::foundation::SubscriptionRecordId;
use crate::domain::membership::{MembershipError, SubscriptionRecord};
use crate::ports::MemberStore;

/// How to find a subscription record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetSubscriptionQuery {
    ById(SubscriptionRecordId),
    /// By the billing provider's subscription id.
    ByExternalId(String),
}

pub struct GetSubscriptionHandler {
    store: Arc<dyn MemberStore>,
}

impl GetSubscriptionHandler {
    pub fn new(store: Arc<dyn MemberStore>) -> Self {
        Self { store }
    }

    pub async fn handle(
        &self,
        query: GetSubscriptionQuery,
    ) -> Result<SubscriptionRecord, MembershipError> {
        let found = match &query {
            GetSubscriptionQuery::ById(id) => self.store.find_subscription(id).await?,
            GetSubscriptionQuery::ByExternalId(external) => {
                self.store.find_subscription_by_external_id(external).await?
            }
        };

        found.ok_or_else(|| MembershipError::not_found(format!("Subscription not found: {:?}", query)))
    }
}
