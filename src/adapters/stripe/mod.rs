//! Billing provider adapters.
//!
//! - `StripeBillingProvider` - Stripe REST API client
//! - `MockBillingProvider` - In-memory provider with error injection
//!
//! # Security
//!
//! The API key is held as a `secrecy::SecretString` and never logged.

mod mock_billing_provider;
mod stripe_adapter;
mod wire;

pub use mock_billing_provider::{MethodCall, MockBillingProvider};
pub use stripe_adapter::{StripeBillingProvider, StripeConfig, DEFAULT_API_BASE_URL};
pub use wire::{StripeCustomer, StripePaymentMethod, StripePrice, StripeSubscription};
