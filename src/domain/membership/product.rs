//! Products (tiers) a member can be entitled to.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::ProductId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductKind {
    Free,
    Paid,
}

/// A product or tier, linked to the billing provider's product and prices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub kind: ProductKind,
    /// Archived products cannot be granted or sold.
    pub active: bool,
    pub external_product_id: Option<String>,
    pub external_price_ids: Vec<String>,
}

impl Product {
    pub fn new(name: impl Into<String>, kind: ProductKind) -> Self {
        Self {
            id: ProductId::new(),
            name: name.into(),
            kind,
            active: true,
            external_product_id: None,
            external_price_ids: Vec::new(),
        }
    }

    pub fn with_external_product(mut self, product_id: impl Into<String>) -> Self {
        self.external_product_id = Some(product_id.into());
        self
    }

    pub fn with_price(mut self, price_id: impl Into<String>) -> Self {
        self.external_price_ids.push(price_id.into());
        self
    }

    pub fn has_price(&self, price_id: &str) -> bool {
        self.external_price_ids.iter().any(|p| p == price_id)
    }

    /// Applies a patch in place. Price links are only ever added.
    pub fn apply(&mut self, patch: &ProductPatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(active) = patch.active {
            self.active = active;
        }
        if let Some(external) = &patch.external_product_id {
            self.external_product_id = Some(external.clone());
        }
        for price_id in &patch.add_price_ids {
            if !self.has_price(price_id) {
                self.external_price_ids.push(price_id.clone());
            }
        }
    }
}

/// How to look up a single product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductSelector {
    ById(ProductId),
    ByExternalProductId(String),
    ByExternalPriceId(String),
}

/// Partial update of a product.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductPatch {
    pub id: ProductId,
    pub name: Option<String>,
    pub active: Option<bool>,
    pub external_product_id: Option<String>,
    pub add_price_ids: Vec<String>,
}

impl ProductPatch {
    pub fn link_price(id: ProductId, price_id: impl Into<String>) -> Self {
        Self {
            id,
            add_price_ids: vec![price_id.into()],
            ..Self::default()
        }
    }
}

/// Filter for listing products. `None` fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductFilter {
    pub kind: Option<ProductKind>,
    pub active: Option<bool>,
}

impl ProductFilter {
    pub fn active_paid() -> Self {
        Self {
            kind: Some(ProductKind::Paid),
            active: Some(true),
        }
    }

    pub fn matches(&self, product: &Product) -> bool {
        self.kind.map_or(true, |k| product.kind == k)
            && self.active.map_or(true, |a| product.active == a)
    }
}
