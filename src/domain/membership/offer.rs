//! Offers and signup attribution.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::OfferId;

/// A promotional offer, optionally backed by a provider coupon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub name: String,
    /// Coupon id at the billing provider; trial offers have none.
    pub external_coupon_id: Option<String>,
}

impl Offer {
    pub fn new(name: impl Into<String>, external_coupon_id: Option<String>) -> Self {
        Self {
            id: OfferId::new(),
            name: name.into(),
            external_coupon_id,
        }
    }
}

/// Where a signup came from. Carried on `subscription.created` events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribution {
    pub id: Option<String>,
    pub url: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub referrer_source: Option<String>,
    pub referrer_medium: Option<String>,
    pub referrer_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribution_kind_serializes_as_type() {
        let attribution = Attribution {
            kind: Some("post".to_string()),
            ..Attribution::default()
        };
        let json = serde_json::to_value(&attribution).unwrap();
        assert_eq!(json["type"], "post");
    }
}
