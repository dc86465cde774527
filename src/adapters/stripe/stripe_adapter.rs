//! Stripe billing provider adapter.
//!
//! Implements [`BillingProvider`] against the Stripe REST API: form-encoded
//! requests, basic auth with the secret key, JSON responses mapped into
//! provider-neutral snapshots.
//!
//! # Error mapping
//!
//! | Response            | `BillingErrorCode`     | Retryable |
//! |---------------------|------------------------|-----------|
//! | transport failure   | `NetworkError`         | yes       |
//! | 401 / 403           | `AuthenticationError`  | no        |
//! | 404                 | `NotFound`             | no        |
//! | 429                 | `RateLimited`          | yes       |
//! | 5xx                 | `ProviderUnavailable`  | yes       |
//! | other 4xx           | `InvalidRequest`       | no        |
//!
//! # Configuration
//!
//! ```ignore
//! let config = StripeConfig::new(api_key);
//! let billing = StripeBillingProvider::new(config)?;
//! ```

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::config::{BillingConfig, ValidationError};
use crate::domain::billing::{PaymentMethod, SubscriptionSnapshot};
use crate::ports::{BillingError, BillingErrorCode, BillingProvider, CreateCustomerRequest, Customer};

use super::wire::{
    StripeCustomer, StripeErrorBody, StripeList, StripePaymentMethod, StripeSubscription,
    CANCELLATION_REASON_KEY,
};

pub const DEFAULT_API_BASE_URL: &str = "https://api.stripe.com";

/// Stripe API configuration.
#[derive(Clone)]
pub struct StripeConfig {
    /// Secret API key (sk_live_... or sk_test_...).
    api_key: SecretString,
    api_base_url: String,
    timeout: Duration,
}

impl StripeConfig {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            api_key,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Builds the client configuration from the billing section.
    ///
    /// # Errors
    ///
    /// `MissingRequired` when no API key is configured.
    pub fn from_config(config: &BillingConfig) -> Result<Self, ValidationError> {
        let api_key = config
            .stripe_api_key
            .clone()
            .ok_or(ValidationError::MissingRequired("BILLING__STRIPE_API_KEY"))?;
        Ok(Self::new(api_key).with_base_url(config.api_base_url.clone()))
    }

    /// Set a custom API base URL (for testing against a stub server).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_test_mode(&self) -> bool {
        self.api_key.expose_secret().starts_with("sk_test_")
    }
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("api_key", &"[REDACTED]")
            .field("api_base_url", &self.api_base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Stripe billing provider.
pub struct StripeBillingProvider {
    config: StripeConfig,
    http_client: reqwest::Client,
}

impl StripeBillingProvider {
    pub fn new(config: StripeConfig) -> Result<Self, BillingError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BillingError::new(BillingErrorCode::Unknown, e.to_string()))?;
        Ok(Self {
            config,
            http_client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.config.api_base_url, path)
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.http_client
            .get(self.url(path))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.http_client
            .post(self.url(path))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
    }

    fn delete(&self, path: &str) -> RequestBuilder {
        self.http_client
            .delete(self.url(path))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
    }

    /// Sends a request and decodes the JSON body, mapping failures.
    ///
    /// `resource` and `id` name the object for `NotFound` messages.
    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        resource: &str,
        id: &str,
    ) -> Result<T, BillingError> {
        let response = request.send().await.map_err(|e| {
            tracing::warn!(resource, id, error = %e, "Stripe request failed");
            BillingError::network(e.to_string())
        })?;

        let status = response.status();
        if status.is_success() {
            return response.json::<T>().await.map_err(|e| {
                BillingError::new(
                    BillingErrorCode::Unknown,
                    format!("Failed to parse Stripe response: {}", e),
                )
            });
        }

        let body = response.text().await.unwrap_or_default();
        let api_error = serde_json::from_str::<StripeErrorBody>(&body)
            .ok()
            .map(|b| b.error);
        let message = api_error
            .as_ref()
            .and_then(|e| e.message.clone())
            .unwrap_or_else(|| format!("Stripe API returned {}", status));

        let error = match status {
            StatusCode::NOT_FOUND => BillingError::not_found(resource, id),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BillingError::authentication(message),
            StatusCode::TOO_MANY_REQUESTS => BillingError::new(BillingErrorCode::RateLimited, message),
            s if s.is_server_error() => {
                BillingError::new(BillingErrorCode::ProviderUnavailable, message)
            }
            _ => BillingError::invalid_request(message),
        };
        let error = match api_error.and_then(|e| e.code) {
            Some(code) => error.with_provider_code(code),
            None => error,
        };

        if error.retryable {
            tracing::warn!(resource, id, status = %status, error = %error, "Stripe call failed, retryable");
        } else {
            tracing::error!(resource, id, status = %status, error = %error, "Stripe call rejected");
        }
        Err(error)
    }

    async fn update_subscription(
        &self,
        subscription_id: &str,
        params: &[(&str, String)],
    ) -> Result<SubscriptionSnapshot, BillingError> {
        let request = self
            .post(&format!("subscriptions/{}", subscription_id))
            .form(params);
        let sub: StripeSubscription = self.send(request, "Subscription", subscription_id).await?;
        Ok(sub.into())
    }
}

#[async_trait]
impl BillingProvider for StripeBillingProvider {
    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionSnapshot, BillingError> {
        let request = self.get(&format!("subscriptions/{}", subscription_id));
        let sub: StripeSubscription = self.send(request, "Subscription", subscription_id).await?;
        Ok(sub.into())
    }

    async fn get_customer(&self, customer_id: &str) -> Result<Customer, BillingError> {
        let request = self
            .get(&format!("customers/{}", customer_id))
            .query(&[("expand[]", "subscriptions")]);
        let mut customer: StripeCustomer = self.send(request, "Customer", customer_id).await?;
        if customer.deleted {
            return Err(BillingError::not_found("Customer", customer_id));
        }

        let mut subscriptions = customer.subscriptions.take().unwrap_or_default();
        while let Some(after) = subscriptions.next_page_after().map(str::to_string) {
            tracing::debug!(customer_id, starting_after = %after, "Fetching next subscription page");
            let request = self.get("subscriptions").query(&[
                ("customer", customer_id),
                ("limit", "100"),
                ("starting_after", after.as_str()),
            ]);
            let page: StripeList<StripeSubscription> =
                self.send(request, "Subscription", customer_id).await?;
            subscriptions.append_page(page);
        }
        customer.subscriptions = Some(subscriptions);

        Ok(customer.into())
    }

    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<Customer, BillingError> {
        let mut params = vec![
            ("email", request.email.clone()),
            ("metadata[member_id]", request.member_id.clone()),
        ];
        if let Some(name) = &request.name {
            params.push(("name", name.clone()));
        }

        let http = self
            .post("customers")
            .header("Idempotency-Key", uuid::Uuid::new_v4().to_string())
            .form(&params);
        let customer: StripeCustomer = self.send(http, "Customer", &request.email).await?;

        tracing::info!(
            customer_id = %customer.id,
            member_id = %request.member_id,
            "Created Stripe customer"
        );
        Ok(customer.into())
    }

    async fn update_customer_email(
        &self,
        customer_id: &str,
        email: &str,
    ) -> Result<Customer, BillingError> {
        let request = self
            .post(&format!("customers/{}", customer_id))
            .form(&[("email", email)]);
        let customer: StripeCustomer = self.send(request, "Customer", customer_id).await?;
        Ok(customer.into())
    }

    async fn cancel_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionSnapshot, BillingError> {
        let request = self.delete(&format!("subscriptions/{}", subscription_id));
        let sub: StripeSubscription = self.send(request, "Subscription", subscription_id).await?;
        Ok(sub.into())
    }

    async fn cancel_subscription_at_period_end(
        &self,
        subscription_id: &str,
        reason: Option<&str>,
    ) -> Result<SubscriptionSnapshot, BillingError> {
        let reason_key = format!("metadata[{}]", CANCELLATION_REASON_KEY);
        let params = [
            ("cancel_at_period_end", "true".to_string()),
            (reason_key.as_str(), reason.unwrap_or_default().to_string()),
        ];
        self.update_subscription(subscription_id, &params).await
    }

    async fn continue_subscription_at_period_end(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionSnapshot, BillingError> {
        let reason_key = format!("metadata[{}]", CANCELLATION_REASON_KEY);
        let params = [
            ("cancel_at_period_end", "false".to_string()),
            (reason_key.as_str(), String::new()),
        ];
        self.update_subscription(subscription_id, &params).await
    }

    async fn update_subscription_item_price(
        &self,
        subscription_id: &str,
        item_id: &str,
        price_id: &str,
    ) -> Result<SubscriptionSnapshot, BillingError> {
        let params = [
            ("items[0][id]", item_id.to_string()),
            ("items[0][price]", price_id.to_string()),
            ("proration_behavior", "always_invoice".to_string()),
        ];
        self.update_subscription(subscription_id, &params).await
    }

    async fn create_subscription(
        &self,
        customer_id: &str,
        price_id: &str,
    ) -> Result<SubscriptionSnapshot, BillingError> {
        let request = self
            .post("subscriptions")
            .header("Idempotency-Key", uuid::Uuid::new_v4().to_string())
            .form(&[("customer", customer_id), ("items[0][price]", price_id)]);
        let sub: StripeSubscription = self.send(request, "Customer", customer_id).await?;

        tracing::info!(
            subscription_id = %sub.id,
            customer_id = %customer_id,
            price_id = %price_id,
            "Created Stripe subscription"
        );
        Ok(sub.into())
    }

    async fn get_card_payment_method(
        &self,
        payment_method_id: &str,
    ) -> Result<PaymentMethod, BillingError> {
        let request = self.get(&format!("payment_methods/{}", payment_method_id));
        let pm: StripePaymentMethod = self
            .send(request, "PaymentMethod", payment_method_id)
            .await?;
        Ok(pm.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(key: &str) -> StripeConfig {
        StripeConfig::new(SecretString::new(key.to_string()))
    }

    #[test]
    fn base_url_is_normalized() {
        let provider =
            StripeBillingProvider::new(config("sk_test_x").with_base_url("http://localhost:12111/"))
                .unwrap();

        assert_eq!(
            provider.url("subscriptions/sub_1"),
            "http://localhost:12111/v1/subscriptions/sub_1"
        );
    }

    #[test]
    fn from_config_requires_api_key() {
        let missing = BillingConfig::default();
        assert!(StripeConfig::from_config(&missing).is_err());

        let configured = BillingConfig {
            enabled: true,
            stripe_api_key: Some(SecretString::new("sk_test_x".to_string())),
            api_base_url: "http://localhost:12111".to_string(),
            complimentary_price_id: None,
        };
        let config = StripeConfig::from_config(&configured).unwrap();
        assert!(config.is_test_mode());
        assert_eq!(config.api_base_url, "http://localhost:12111");
    }

    #[test]
    fn test_mode_follows_key_prefix() {
        assert!(config("sk_test_abc").is_test_mode());
        assert!(!config("sk_live_abc").is_test_mode());
    }

    #[test]
    fn debug_redacts_api_key() {
        let rendered = format!("{:?}", config("sk_live_secret"));

        assert!(!rendered.contains("sk_live_secret"));
        assert!(rendered.contains("REDACTED"));
    }

    #[tokio::test]
    async fn unreachable_host_is_a_retryable_network_error() {
        let provider = StripeBillingProvider::new(
            config("sk_test_x")
                .with_base_url("http://127.0.0.1:9")
                .with_timeout(Duration::from_millis(500)),
        )
        .unwrap();

        let err = provider.get_subscription("sub_1").await.unwrap_err();

        assert_eq!(err.code, BillingErrorCode::NetworkError);
        assert!(err.retryable);
    }
}
