//! In-memory product and offer repositories.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, ErrorCode, OfferId};
use crate::domain::membership::{Offer, Product, ProductFilter, ProductPatch, ProductSelector};
use crate::ports::{OfferRepository, ProductRepository};

/// Products kept in insertion order, which is also the listing order.
#[derive(Clone, Default)]
pub struct InMemoryProductRepository {
    products: Arc<RwLock<Vec<Product>>>,
    fail_reads: Arc<AtomicBool>,
}

impl InMemoryProductRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, product: Product) {
        self.products.write().await.push(product);
    }

    /// Makes `get` and `list` fail with a database error until reset.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    fn check_reads(&self) -> Result<(), DomainError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(DomainError::database("Product store unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl ProductRepository for InMemoryProductRepository {
    async fn get(&self, selector: &ProductSelector) -> Result<Option<Product>, DomainError> {
        self.check_reads()?;
        let products = self.products.read().await;
        let found = products.iter().find(|p| match selector {
            ProductSelector::ById(id) => p.id == *id,
            ProductSelector::ByExternalProductId(external) => {
                p.external_product_id.as_deref() == Some(external.as_str())
            }
            ProductSelector::ByExternalPriceId(price_id) => p.has_price(price_id),
        });
        Ok(found.cloned())
    }

    async fn update(&self, patch: &ProductPatch) -> Result<Product, DomainError> {
        let mut products = self.products.write().await;
        let product = products
            .iter_mut()
            .find(|p| p.id == patch.id)
            .ok_or_else(|| {
                DomainError::new(
                    ErrorCode::ProductNotFound,
                    format!("Product {} not found", patch.id),
                )
            })?;
        product.apply(patch);
        Ok(product.clone())
    }

    async fn list(&self, filter: &ProductFilter) -> Result<Vec<Product>, DomainError> {
        self.check_reads()?;
        Ok(self
            .products
            .read()
            .await
            .iter()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryOfferRepository {
    offers: Arc<RwLock<Vec<Offer>>>,
}

impl InMemoryOfferRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, offer: Offer) {
        self.offers.write().await.push(offer);
    }
}

#[async_trait]
impl OfferRepository for InMemoryOfferRepository {
    async fn get_by_external_coupon_id(
        &self,
        coupon_id: &str,
    ) -> Result<Option<Offer>, DomainError> {
        Ok(self
            .offers
            .read()
            .await
            .iter()
            .find(|o| o.external_coupon_id.as_deref() == Some(coupon_id))
            .cloned())
    }

    async fn get_by_id(&self, id: &OfferId) -> Result<Option<Offer>, DomainError> {
        Ok(self
            .offers
            .read()
            .await
            .iter()
            .find(|o| o.id == *id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::ProductId;
    use crate::domain::membership::ProductKind;

    #[tokio::test]
    async fn get_by_price_and_external_product() {
        let repo = InMemoryProductRepository::new();
        let gold = Product::new("Gold", ProductKind::Paid)
            .with_external_product("prod_gold")
            .with_price("price_month");
        repo.insert(gold.clone()).await;

        let by_price = repo
            .get(&ProductSelector::ByExternalPriceId("price_month".into()))
            .await
            .unwrap();
        let by_product = repo
            .get(&ProductSelector::ByExternalProductId("prod_gold".into()))
            .await
            .unwrap();

        assert_eq!(by_price.map(|p| p.id), Some(gold.id));
        assert_eq!(by_product.map(|p| p.id), Some(gold.id));
    }

    #[tokio::test]
    async fn update_links_price() {
        let repo = InMemoryProductRepository::new();
        let gold = Product::new("Gold", ProductKind::Paid);
        repo.insert(gold.clone()).await;

        let updated = repo
            .update(&ProductPatch::link_price(gold.id, "price_year"))
            .await
            .unwrap();

        assert!(updated.has_price("price_year"));
    }

    #[tokio::test]
    async fn update_unknown_product_is_not_found() {
        let repo = InMemoryProductRepository::new();

        let err = repo
            .update(&ProductPatch::link_price(ProductId::new(), "price_x"))
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::ProductNotFound);
    }

    #[tokio::test]
    async fn list_keeps_insertion_order() {
        let repo = InMemoryProductRepository::new();
        let free = Product::new("Free", ProductKind::Free);
        let silver = Product::new("Silver", ProductKind::Paid);
        let gold = Product::new("Gold", ProductKind::Paid);
        for p in [free, silver.clone(), gold.clone()] {
            repo.insert(p).await;
        }

        let paid = repo.list(&ProductFilter::active_paid()).await.unwrap();

        assert_eq!(
            paid.iter().map(|p| p.id).collect::<Vec<_>>(),
            vec![silver.id, gold.id]
        );
    }

    #[tokio::test]
    async fn offers_are_found_by_coupon() {
        let repo = InMemoryOfferRepository::new();
        let offer = Offer::new("Black Friday", Some("coupon_bf".into()));
        repo.insert(offer.clone()).await;

        let found = repo.get_by_external_coupon_id("coupon_bf").await.unwrap();

        assert_eq!(found, Some(offer));
        assert!(repo.get_by_external_coupon_id("nope").await.unwrap().is_none());
    }
}
