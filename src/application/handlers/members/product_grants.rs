//! Validation of products granted directly to a member.

use crate::domain::foundation::ProductId;
use crate::domain::membership::{EntitlementPolicy, MembershipError, ProductSelector};
use crate::ports::ProductRepository;

/// Checks that every requested product exists and is active, and that the
/// entitlement policy allows the requested count.
pub(crate) async fn validate_product_grants(
    products: &dyn ProductRepository,
    requested: &[ProductId],
    policy: EntitlementPolicy,
) -> Result<Vec<ProductId>, MembershipError> {
    let mut unique: Vec<ProductId> = Vec::with_capacity(requested.len());
    for id in requested {
        if !unique.contains(id) {
            unique.push(*id);
        }
    }

    if policy == EntitlementPolicy::Replace && unique.len() > 1 {
        return Err(MembershipError::bad_request(
            "Only one product can be granted at a time",
        ));
    }

    for id in &unique {
        let product = products
            .get(&ProductSelector::ById(*id))
            .await?
            .ok_or_else(|| MembershipError::not_found(format!("Product {} not found", id)))?;
        if !product.active {
            return Err(MembershipError::bad_request(format!(
                "Cannot grant archived product '{}'",
                product.name
            )));
        }
    }

    Ok(unique)
}
