//! Stripe API objects as they arrive over the wire.
//!
//! Only the fields the reconciler reads are modelled. Each object maps into
//! the provider-neutral snapshot types of `domain::billing`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::billing::{
    Coupon, CouponDuration, Discount, PaymentMethod, PriceSnapshot, SubscriptionItem,
    SubscriptionSnapshot, SubscriptionStatus,
};
use crate::ports::Customer;

/// Metadata key under which a cancellation reason is stored.
pub const CANCELLATION_REASON_KEY: &str = "cancellation_reason";

/// Generic Stripe list wrapper.
///
/// Expanded lists hold at most 10 entries; `has_more` marks a truncated one.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeList<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default)]
    pub has_more: bool,
}

impl<T> Default for StripeList<T> {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            has_more: false,
        }
    }
}

impl<T> StripeList<T> {
    /// Appends the next page; a page with no data ends paging.
    pub fn append_page(&mut self, page: StripeList<T>) {
        self.has_more = page.has_more && !page.data.is_empty();
        self.data.extend(page.data);
    }
}

impl StripeList<StripeSubscription> {
    /// Cursor for the next page, if the list is truncated.
    pub fn next_page_after(&self) -> Option<&str> {
        if !self.has_more {
            return None;
        }
        self.data.last().map(|s| s.id.as_str())
    }
}

/// Stripe Customer object, optionally with subscriptions expanded.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeCustomer {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub deleted: bool,
    pub subscriptions: Option<StripeList<StripeSubscription>>,
}

impl From<StripeCustomer> for Customer {
    fn from(customer: StripeCustomer) -> Self {
        Customer {
            id: customer.id,
            email: customer.email,
            name: customer.name,
            subscriptions: customer
                .subscriptions
                .unwrap_or_default()
                .data
                .into_iter()
                .map(SubscriptionSnapshot::from)
                .collect(),
        }
    }
}

/// Stripe Subscription object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeSubscription {
    pub id: String,
    pub customer: String,
    pub status: String,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    pub start_date: i64,
    pub current_period_end: i64,
    pub trial_start: Option<i64>,
    pub trial_end: Option<i64>,
    #[serde(default)]
    pub items: StripeList<StripeSubscriptionItem>,
    pub discount: Option<StripeDiscount>,
    pub default_payment_method: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl From<StripeSubscription> for SubscriptionSnapshot {
    fn from(sub: StripeSubscription) -> Self {
        let cancellation_reason = sub
            .metadata
            .get(CANCELLATION_REASON_KEY)
            .filter(|r| !r.is_empty())
            .cloned();
        SubscriptionSnapshot {
            id: sub.id,
            customer_id: sub.customer,
            status: SubscriptionStatus::parse(&sub.status),
            cancel_at_period_end: sub.cancel_at_period_end,
            cancellation_reason,
            start_date: sub.start_date,
            current_period_end: sub.current_period_end,
            trial_start: sub.trial_start,
            trial_end: sub.trial_end,
            items: sub
                .items
                .data
                .into_iter()
                .map(|item| SubscriptionItem {
                    id: item.id,
                    price: item.price.into(),
                })
                .collect(),
            discount: sub.discount.map(Discount::from),
            default_payment_method: sub.default_payment_method,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeSubscriptionItem {
    pub id: String,
    pub price: StripePrice,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripePrice {
    pub id: String,
    pub product: String,
    pub nickname: Option<String>,
    /// Unit amount in minor units; absent for metered prices.
    pub unit_amount: Option<i64>,
    pub currency: String,
    pub recurring: Option<StripePriceRecurring>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripePriceRecurring {
    pub interval: String,
}

impl From<StripePrice> for PriceSnapshot {
    fn from(price: StripePrice) -> Self {
        PriceSnapshot {
            id: price.id,
            product_id: price.product,
            nickname: price.nickname,
            unit_amount: price.unit_amount.unwrap_or(0),
            currency: price.currency,
            interval: price.recurring.map(|r| r.interval).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeDiscount {
    pub coupon: StripeCoupon,
    pub end: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeCoupon {
    pub id: String,
    pub duration: CouponDuration,
    pub percent_off: Option<f64>,
    pub amount_off: Option<i64>,
}

impl From<StripeDiscount> for Discount {
    fn from(discount: StripeDiscount) -> Self {
        Discount {
            coupon: Coupon {
                id: discount.coupon.id,
                duration: discount.coupon.duration,
                percent_off: discount.coupon.percent_off,
                amount_off: discount.coupon.amount_off,
            },
            end: discount.end,
        }
    }
}

/// Stripe PaymentMethod object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripePaymentMethod {
    pub id: String,
    pub card: Option<StripeCard>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeCard {
    pub brand: Option<String>,
    pub last4: Option<String>,
}

impl From<StripePaymentMethod> for PaymentMethod {
    fn from(pm: StripePaymentMethod) -> Self {
        let (card_brand, card_last4) = match pm.card {
            Some(card) => (card.brand, card.last4),
            None => (None, None),
        };
        PaymentMethod {
            id: pm.id,
            card_brand,
            card_last4,
        }
    }
}

/// Error body returned by the Stripe API.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeErrorBody {
    pub error: StripeApiError,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeApiError {
    pub message: Option<String>,
    pub code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn subscription_json() -> serde_json::Value {
        json!({
            "id": "sub_123",
            "object": "subscription",
            "customer": "cus_123",
            "status": "active",
            "cancel_at_period_end": true,
            "start_date": 1704067200,
            "current_period_end": 1706745600,
            "trial_start": null,
            "trial_end": null,
            "default_payment_method": "pm_123",
            "metadata": { "cancellation_reason": "Too expensive" },
            "discount": {
                "coupon": {
                    "id": "coupon_half",
                    "duration": "forever",
                    "percent_off": 50.0,
                    "amount_off": null
                },
                "end": null
            },
            "items": {
                "object": "list",
                "data": [{
                    "id": "si_123",
                    "price": {
                        "id": "price_month",
                        "product": "prod_gold",
                        "nickname": "Gold monthly",
                        "unit_amount": 1000,
                        "currency": "usd",
                        "recurring": { "interval": "month", "interval_count": 1 }
                    }
                }]
            }
        })
    }

    #[test]
    fn subscription_maps_to_snapshot() {
        let sub: StripeSubscription = serde_json::from_value(subscription_json()).unwrap();
        let snapshot = SubscriptionSnapshot::from(sub);

        assert_eq!(snapshot.id, "sub_123");
        assert_eq!(snapshot.status, SubscriptionStatus::Active);
        assert!(snapshot.cancel_at_period_end);
        assert_eq!(snapshot.cancellation_reason.as_deref(), Some("Too expensive"));
        assert_eq!(snapshot.coupon_id(), Some("coupon_half"));
        assert!(snapshot.discount.as_ref().unwrap().is_forever());

        let price = snapshot.price().unwrap();
        assert_eq!(price.id, "price_month");
        assert_eq!(price.product_id, "prod_gold");
        assert_eq!(price.interval, "month");
        assert_eq!(price.unit_amount, 1000);
    }

    #[test]
    fn unknown_status_does_not_fail_parsing() {
        let mut value = subscription_json();
        value["status"] = json!("something_new");

        let sub: StripeSubscription = serde_json::from_value(value).unwrap();

        assert_eq!(
            SubscriptionSnapshot::from(sub).status,
            SubscriptionStatus::Unknown
        );
    }

    #[test]
    fn empty_cancellation_reason_is_none() {
        let mut value = subscription_json();
        value["metadata"] = json!({ "cancellation_reason": "" });

        let sub: StripeSubscription = serde_json::from_value(value).unwrap();

        assert!(SubscriptionSnapshot::from(sub).cancellation_reason.is_none());
    }

    #[test]
    fn customer_includes_expanded_subscriptions() {
        let value = json!({
            "id": "cus_123",
            "email": "jamie@example.com",
            "name": "Jamie",
            "subscriptions": { "object": "list", "data": [subscription_json()] }
        });

        let customer: Customer = serde_json::from_value::<StripeCustomer>(value)
            .unwrap()
            .into();

        assert_eq!(customer.email.as_deref(), Some("jamie@example.com"));
        assert_eq!(customer.subscriptions.len(), 1);
    }

    #[test]
    fn truncated_subscription_list_pages_from_last_id() {
        let value = json!({
            "object": "list",
            "has_more": true,
            "data": [subscription_json()]
        });
        let mut list: StripeList<StripeSubscription> = serde_json::from_value(value).unwrap();
        let first_id = list.data[0].id.clone();

        assert_eq!(list.next_page_after(), Some(first_id.as_str()));

        let mut second = subscription_json();
        second["id"] = json!("sub_page_2");
        list.append_page(StripeList {
            data: vec![serde_json::from_value(second).unwrap()],
            has_more: false,
        });

        assert_eq!(list.data.len(), 2);
        assert_eq!(list.next_page_after(), None);
    }

    #[test]
    fn empty_page_stops_paging() {
        let mut list: StripeList<StripeSubscription> = StripeList {
            data: vec![serde_json::from_value(subscription_json()).unwrap()],
            has_more: true,
        };

        list.append_page(StripeList {
            data: Vec::new(),
            has_more: true,
        });

        assert_eq!(list.next_page_after(), None);
    }

    #[test]
    fn payment_method_without_card() {
        let pm: StripePaymentMethod =
            serde_json::from_value(json!({ "id": "pm_1", "card": null })).unwrap();

        let pm = PaymentMethod::from(pm);

        assert_eq!(pm.card_last4, None);
        assert_eq!(pm.card_brand, None);
    }
}
