//! Billing provider port - Interface for subscription billing (e.g. Stripe).
//!
//! The reconciler reads subscription state through this port and mutates it
//! here first before reconciling the resulting snapshot locally.
//!
//! Every call may fail with a retryable transport error or a terminal
//! `NotFound`; see [`BillingError`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::billing::{PaymentMethod, SubscriptionSnapshot};

pub use crate::domain::billing::{BillingError, BillingErrorCode};

/// Port for billing provider operations.
#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Fetch the current state of a subscription.
    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionSnapshot, BillingError>;

    /// Fetch a customer together with its subscriptions.
    async fn get_customer(&self, customer_id: &str) -> Result<Customer, BillingError>;

    /// Create a customer for a member.
    async fn create_customer(&self, request: CreateCustomerRequest)
        -> Result<Customer, BillingError>;

    /// Change the email stored on a customer.
    async fn update_customer_email(
        &self,
        customer_id: &str,
        email: &str,
    ) -> Result<Customer, BillingError>;

    /// Cancel a subscription immediately.
    async fn cancel_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionSnapshot, BillingError>;

    /// Schedule cancellation at the end of the current period.
    async fn cancel_subscription_at_period_end(
        &self,
        subscription_id: &str,
        reason: Option<&str>,
    ) -> Result<SubscriptionSnapshot, BillingError>;

    /// Undo a scheduled cancellation.
    async fn continue_subscription_at_period_end(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionSnapshot, BillingError>;

    /// Swap the price on one subscription item.
    async fn update_subscription_item_price(
        &self,
        subscription_id: &str,
        item_id: &str,
        price_id: &str,
    ) -> Result<SubscriptionSnapshot, BillingError>;

    /// Start a subscription for a customer on a single price.
    async fn create_subscription(
        &self,
        customer_id: &str,
        price_id: &str,
    ) -> Result<SubscriptionSnapshot, BillingError>;

    /// Fetch card details of a payment method.
    async fn get_card_payment_method(
        &self,
        payment_method_id: &str,
    ) -> Result<PaymentMethod, BillingError>;
}

/// Request to create a customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCustomerRequest {
    pub email: String,
    pub name: Option<String>,
    /// Internal member id stored as provider metadata.
    pub member_id: String,
}

/// Customer at the billing provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub subscriptions: Vec<SubscriptionSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;

    // Trait object safety test
    #[test]
    fn billing_provider_is_object_safe() {
        fn _accepts_dyn(_provider: &dyn BillingProvider) {}
    }

    #[test]
    fn billing_errors_are_reexported() {
        let err = BillingError::new(BillingErrorCode::NetworkError, "timeout");
        assert!(err.retryable);
    }
}
