//! Entitlement set reconciliation.
//!
//! The set of products a member holds is a projection of their subscriptions
//! and grants. Each pass computes the next set and diffs it against the set
//! actually stored; only the diff becomes `member.product_changed` events.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{ProductId, ValidationError};

/// How an active subscription's product combines with existing entitlements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitlementPolicy {
    /// One active plan, one entitlement.
    #[default]
    Replace,
    /// Products from several subscriptions stack.
    Union,
}

impl FromStr for EntitlementPolicy {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "replace" => Ok(EntitlementPolicy::Replace),
            "union" => Ok(EntitlementPolicy::Union),
            other => Err(ValidationError::invalid_format(
                "entitlement_policy",
                format!("expected 'replace' or 'union', got '{}'", other),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductChange {
    Added,
    Removed,
}

impl fmt::Display for ProductChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProductChange::Added => f.write_str("added"),
            ProductChange::Removed => f.write_str("removed"),
        }
    }
}

/// One entry of an entitlement diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductDiff {
    pub product_id: ProductId,
    pub change: ProductChange,
}

/// Inputs to one reconciliation pass for a single subscription.
#[derive(Debug, Clone, Copy)]
pub struct EntitlementInput<'a> {
    /// Entitlements currently stored for the member.
    pub current: &'a [ProductId],
    /// Product the stored subscription row pointed at, if any.
    pub previous_product: Option<ProductId>,
    /// Product resolved for the new snapshot's price, if any.
    pub new_product: Option<ProductId>,
    /// Whether the new snapshot grants access.
    pub grants_access: bool,
    /// Products granted by the member's other active subscriptions.
    pub other_active_products: &'a [ProductId],
}

/// Outcome of a pass: the next set and its diff against the stored one.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EntitlementPlan {
    pub next: Vec<ProductId>,
    pub diff: Vec<ProductDiff>,
}

impl EntitlementPlan {
    pub fn is_unchanged(&self) -> bool {
        self.diff.is_empty()
    }
}

/// Computes the next entitlement set for a member.
pub fn reconcile_entitlements(input: EntitlementInput<'_>, policy: EntitlementPolicy) -> EntitlementPlan {
    let still_granted = |product: &ProductId| input.other_active_products.contains(product);
    let mut next: Vec<ProductId> = input.current.to_vec();

    if input.grants_access {
        if let Some(product) = input.new_product {
            match policy {
                EntitlementPolicy::Replace => next = vec![product],
                EntitlementPolicy::Union => next.push(product),
            }

            if let Some(old) = input.previous_product.filter(|old| *old != product) {
                if !still_granted(&old) {
                    next.retain(|p| *p != old);
                }
            }
        }
    } else {
        for product in [input.new_product, input.previous_product].into_iter().flatten() {
            if !still_granted(&product) {
                next.retain(|p| *p != product);
            }
        }

        // Replace dropped the surviving subscriptions' products when this one
        // took over; hand the set back to one of them.
        if policy == EntitlementPolicy::Replace && !next.iter().any(|p| still_granted(p)) {
            if let Some(survivor) = input.other_active_products.first() {
                next.push(*survivor);
            }
        }
    }

    let next = dedupe(next);
    let diff = diff_sets(input.current, &next);
    EntitlementPlan { next, diff }
}

/// Diff from `before` to `after`: removals first, then additions.
///
/// A product is never both added and removed.
pub fn diff_sets(before: &[ProductId], after: &[ProductId]) -> Vec<ProductDiff> {
    let removed = dedupe(before.iter().copied().filter(|p| !after.contains(p)).collect())
        .into_iter()
        .map(|product_id| ProductDiff {
            product_id,
            change: ProductChange::Removed,
        });
    let added = dedupe(after.iter().copied().filter(|p| !before.contains(p)).collect())
        .into_iter()
        .map(|product_id| ProductDiff {
            product_id,
            change: ProductChange::Added,
        });

    removed.chain(added).collect()
}

fn dedupe(products: Vec<ProductId>) -> Vec<ProductId> {
    let mut seen = Vec::with_capacity(products.len());
    for product in products {
        if !seen.contains(&product) {
            seen.push(product);
        }
    }
    seen
}
