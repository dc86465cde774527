//! Wires configured adapters into [`MemberBillingServices`].

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::adapters::{
    postgres, DisabledBillingProvider, PostgresMemberStore, PostgresOfferRepository,
    PostgresProductRepository, StripeBillingProvider, StripeConfig,
};
use crate::application::MemberBillingServices;
use crate::config::{AppConfig, ValidationError};
use crate::domain::foundation::DomainError;
use crate::ports::{BillingError, BillingProvider, EventPublisher};

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ValidationError),

    #[error("database unavailable: {0}")]
    Database(#[from] DomainError),

    #[error("billing provider unavailable: {0}")]
    Billing(#[from] BillingError),
}

/// Validates `config`, opens the database, and picks the billing provider.
///
/// Events go to `event_publisher`; the caller owns the bus and its subscribers.
pub async fn build_services(
    config: &AppConfig,
    event_publisher: Arc<dyn EventPublisher>,
) -> Result<MemberBillingServices, BootstrapError> {
    config.validate()?;

    let pool = postgres::connect(&config.database).await?;

    let billing: Arc<dyn BillingProvider> = if config.billing.enabled {
        let stripe = StripeConfig::from_config(&config.billing)?;
        info!(test_mode = stripe.is_test_mode(), "Stripe billing enabled");
        Arc::new(StripeBillingProvider::new(stripe)?)
    } else {
        info!("Billing disabled");
        Arc::new(DisabledBillingProvider)
    };

    info!(
        policy = ?config.members.entitlement_policy,
        "Member billing services ready"
    );

    Ok(MemberBillingServices::new(
        Arc::new(PostgresMemberStore::new(pool.clone())),
        billing,
        Arc::new(PostgresProductRepository::new(pool.clone())),
        Arc::new(PostgresOfferRepository::new(pool)),
        event_publisher,
        &config.members,
        &config.billing,
    ))
}
