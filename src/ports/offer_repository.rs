//! Offer repository port.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, OfferId};
use crate::domain::membership::Offer;

#[async_trait]
pub trait OfferRepository: Send + Sync {
    /// Find the offer backed by a provider coupon.
    async fn get_by_external_coupon_id(
        &self,
        coupon_id: &str,
    ) -> Result<Option<Offer>, DomainError>;

    async fn get_by_id(&self, id: &OfferId) -> Result<Option<Offer>, DomainError>;
}
