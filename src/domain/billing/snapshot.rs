//! Provider-side subscription data as delivered to the reconciler.
//!
//! These are plain values: webhook payloads and API responses are mapped into
//! them by the billing adapters, and the reconciler never talks provider JSON.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw subscription status string from the billing provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Unpaid,
    Canceled,
    Incomplete,
    IncompleteExpired,
    Paused,
    /// Any status string this crate does not know about.
    #[serde(other)]
    Unknown,
}

impl SubscriptionStatus {
    /// Parses a provider status string; unknown strings map to `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s {
            "active" => SubscriptionStatus::Active,
            "trialing" => SubscriptionStatus::Trialing,
            "past_due" => SubscriptionStatus::PastDue,
            "unpaid" => SubscriptionStatus::Unpaid,
            "canceled" => SubscriptionStatus::Canceled,
            "incomplete" => SubscriptionStatus::Incomplete,
            "incomplete_expired" => SubscriptionStatus::IncompleteExpired,
            "paused" => SubscriptionStatus::Paused,
            _ => SubscriptionStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Unpaid => "unpaid",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Incomplete => "incomplete",
            SubscriptionStatus::IncompleteExpired => "incomplete_expired",
            SubscriptionStatus::Paused => "paused",
            SubscriptionStatus::Unknown => "unknown",
        }
    }

    /// Statuses under which the subscription still grants access.
    pub fn is_active_class(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Active
                | SubscriptionStatus::Trialing
                | SubscriptionStatus::Unpaid
                | SubscriptionStatus::PastDue
        )
    }

    /// Statuses that contribute no recurring revenue.
    pub fn is_zero_revenue(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Trialing
                | SubscriptionStatus::Incomplete
                | SubscriptionStatus::IncompleteExpired
                | SubscriptionStatus::Canceled
        )
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How long a coupon keeps applying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponDuration {
    Once,
    Repeating,
    Forever,
}

/// Provider coupon attached to a discount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: String,
    pub duration: CouponDuration,
    /// Percentage off, e.g. `50.0`. Mutually exclusive with `amount_off`.
    pub percent_off: Option<f64>,
    /// Fixed amount off in minor units.
    pub amount_off: Option<i64>,
}

/// Discount currently applied to a subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discount {
    pub coupon: Coupon,
    /// Unix seconds when the discount stops applying, if bounded.
    pub end: Option<i64>,
}

impl Discount {
    /// True when the discount applies for the lifetime of the subscription.
    pub fn is_forever(&self) -> bool {
        self.coupon.duration == CouponDuration::Forever && self.end.is_none()
    }
}

/// Price of a subscription item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub id: String,
    /// Provider product id the price belongs to.
    pub product_id: String,
    pub nickname: Option<String>,
    /// Amount in minor units.
    pub unit_amount: i64,
    pub currency: String,
    /// Raw recurring interval (`day`, `week`, `month`, `year`).
    pub interval: String,
}

impl PriceSnapshot {
    /// Complimentary prices are marked by nickname, compared case-insensitively.
    pub fn is_complimentary(&self) -> bool {
        self.nickname
            .as_deref()
            .map(|n| n.eq_ignore_ascii_case("complimentary"))
            .unwrap_or(false)
    }
}

/// One line item of a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionItem {
    pub id: String,
    pub price: PriceSnapshot,
}

/// Card payment method summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: String,
    pub card_brand: Option<String>,
    pub card_last4: Option<String>,
}

/// Point-in-time view of an external billing subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionSnapshot {
    /// Provider subscription id; unique upsert key for the internal record.
    pub id: String,
    pub customer_id: String,
    pub status: SubscriptionStatus,
    pub cancel_at_period_end: bool,
    pub cancellation_reason: Option<String>,
    /// Unix seconds.
    pub start_date: i64,
    pub current_period_end: i64,
    pub trial_start: Option<i64>,
    pub trial_end: Option<i64>,
    pub items: Vec<SubscriptionItem>,
    pub discount: Option<Discount>,
    pub default_payment_method: Option<String>,
}

impl SubscriptionSnapshot {
    /// The subscription's price: the first item's price.
    pub fn price(&self) -> Option<&PriceSnapshot> {
        self.items.first().map(|item| &item.price)
    }

    /// The first item, whose price is swapped on plan changes.
    pub fn primary_item(&self) -> Option<&SubscriptionItem> {
        self.items.first()
    }

    pub fn is_complimentary(&self) -> bool {
        self.price().map(PriceSnapshot::is_complimentary).unwrap_or(false)
    }

    pub fn coupon_id(&self) -> Option<&str> {
        self.discount.as_ref().map(|d| d.coupon.id.as_str())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn price(id: &str, amount: i64, interval: &str) -> PriceSnapshot {
        PriceSnapshot {
            id: id.to_string(),
            product_id: "prod_gold".to_string(),
            nickname: Some("Gold".to_string()),
            unit_amount: amount,
            currency: "usd".to_string(),
            interval: interval.to_string(),
        }
    }

    pub fn snapshot(status: SubscriptionStatus, price: PriceSnapshot) -> SubscriptionSnapshot {
        SubscriptionSnapshot {
            id: "sub_1".to_string(),
            customer_id: "cus_1".to_string(),
            status,
            cancel_at_period_end: false,
            cancellation_reason: None,
            start_date: 1_700_000_000,
            current_period_end: 1_702_592_000,
            trial_start: None,
            trial_end: None,
            items: vec![SubscriptionItem {
                id: "si_1".to_string(),
                price,
            }],
            discount: None,
            default_payment_method: None,
        }
    }
}
