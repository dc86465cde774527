//! Product repository port.
//!
//! Products are configured elsewhere; the reconciler only looks them up and
//! links newly seen provider prices onto them.

use async_trait::async_trait;

use crate::domain::foundation::DomainError;
use crate::domain::membership::{Product, ProductFilter, ProductPatch, ProductSelector};

#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Find one product. Returns `None` if nothing matches.
    async fn get(&self, selector: &ProductSelector) -> Result<Option<Product>, DomainError>;

    /// Apply a patch and return the updated product.
    ///
    /// # Errors
    ///
    /// - `ProductNotFound` if the product doesn't exist
    /// - `DatabaseError` on persistence failure
    async fn update(&self, patch: &ProductPatch) -> Result<Product, DomainError>;

    /// List products matching a filter, in a stable order.
    async fn list(&self, filter: &ProductFilter) -> Result<Vec<Product>, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_repository_is_object_safe() {
        fn _accepts_dyn(_repo: &dyn ProductRepository) {}
    }
}
