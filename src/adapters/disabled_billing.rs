//! Billing provider used when billing is switched off.
//!
//! Every call fails with a non-retryable `InvalidRequest`, so a stray
//! reconciliation degrades instead of reaching a provider that does not exist.

use async_trait::async_trait;

use crate::domain::billing::{PaymentMethod, SubscriptionSnapshot};
use crate::ports::{BillingError, BillingErrorCode, BillingProvider, CreateCustomerRequest, Customer};

#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledBillingProvider;

fn disabled<T>() -> Result<T, BillingError> {
    Err(BillingError::new(
        BillingErrorCode::InvalidRequest,
        "Billing is not configured",
    ))
}

#[async_trait]
impl BillingProvider for DisabledBillingProvider {
    async fn get_subscription(&self, _subscription_id: &str) -> Result<SubscriptionSnapshot, BillingError> {
        disabled()
    }

    async fn get_customer(&self, _customer_id: &str) -> Result<Customer, BillingError> {
        disabled()
    }

    async fn create_customer(&self, _request: CreateCustomerRequest) -> Result<Customer, BillingError> {
        disabled()
    }

    async fn update_customer_email(&self, _customer_id: &str, _email: &str) -> Result<Customer, BillingError> {
        disabled()
    }

    async fn cancel_subscription(&self, _subscription_id: &str) -> Result<SubscriptionSnapshot, BillingError> {
        disabled()
    }

    async fn cancel_subscription_at_period_end(
        &self,
        _subscription_id: &str,
        _reason: Option<&str>,
    ) -> Result<SubscriptionSnapshot, BillingError> {
        disabled()
    }

    async fn continue_subscription_at_period_end(
        &self,
        _subscription_id: &str,
    ) -> Result<SubscriptionSnapshot, BillingError> {
        disabled()
    }

    async fn update_subscription_item_price(
        &self,
        _subscription_id: &str,
        _item_id: &str,
        _price_id: &str,
    ) -> Result<SubscriptionSnapshot, BillingError> {
        disabled()
    }

    async fn create_subscription(
        &self,
        _customer_id: &str,
        _price_id: &str,
    ) -> Result<SubscriptionSnapshot, BillingError> {
        disabled()
    }

    async fn get_card_payment_method(&self, _payment_method_id: &str) -> Result<PaymentMethod, BillingError> {
        disabled()
    }
}
