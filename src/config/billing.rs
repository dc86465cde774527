//! Billing configuration (Stripe)

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;

/// Billing provider configuration.
///
/// Billing is off unless `enabled` is set. With billing off, operations that
/// need the provider (linking a customer at creation, complimentary plans)
/// are rejected.
#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Stripe secret API key
    pub stripe_api_key: Option<SecretString>,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Price used for complimentary subscriptions
    pub complimentary_price_id: Option<String>,
}

impl BillingConfig {
    /// Check if using Stripe test mode
    pub fn is_test_mode(&self) -> bool {
        self.stripe_api_key
            .as_ref()
            .map(|k| k.expose_secret().starts_with("sk_test_"))
            .unwrap_or(false)
    }

    /// The complimentary price, only when billing is enabled.
    pub fn complimentary_price(&self) -> Option<&str> {
        if !self.enabled {
            return None;
        }
        self.complimentary_price_id
            .as_deref()
            .filter(|p| !p.is_empty())
    }

    /// Validate billing configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.api_base_url.starts_with("https://") && !self.api_base_url.starts_with("http://") {
            return Err(ValidationError::InvalidBillingUrl);
        }
        if !self.enabled {
            return Ok(());
        }
        let key = self
            .stripe_api_key
            .as_ref()
            .map(|k| k.expose_secret().as_str())
            .unwrap_or_default();
        if key.is_empty() {
            return Err(ValidationError::MissingRequired("BILLING__STRIPE_API_KEY"));
        }
        // Verify key prefix for safety
        if !key.starts_with("sk_") {
            return Err(ValidationError::InvalidStripeKey);
        }
        Ok(())
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            stripe_api_key: None,
            api_base_url: default_api_base_url(),
            complimentary_price_id: None,
        }
    }
}

fn default_api_base_url() -> String {
    "https://api.stripe.com".to_string()
}
