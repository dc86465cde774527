//! Internal mirror of an external billing subscription.

use serde::{Deserialize, Serialize};

use crate::domain::billing::{
    PaymentMethod, PriceSnapshot, SubscriptionLabel, SubscriptionSnapshot, SubscriptionStatus,
};
use crate::domain::foundation::{MemberId, OfferId, ProductId, SubscriptionRecordId, Timestamp};

/// One row per external subscription id, updated in place on every sighting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub id: SubscriptionRecordId,
    pub member_id: MemberId,
    pub customer_id: String,

    /// External subscription id; the upsert key.
    pub subscription_id: String,

    pub price_id: String,
    pub product_id: Option<ProductId>,
    pub plan_nickname: Option<String>,
    pub plan_interval: String,
    pub plan_amount: i64,
    pub plan_currency: String,

    pub status: SubscriptionStatus,
    pub cancel_at_period_end: bool,
    pub cancellation_reason: Option<String>,

    pub start_date: Timestamp,
    pub current_period_end: Timestamp,
    pub trial_start_at: Option<Timestamp>,
    pub trial_end_at: Option<Timestamp>,

    /// Monthly recurring revenue in minor units.
    pub mrr: i64,

    /// Sticky: once set it is never cleared by a later sighting.
    pub offer_id: Option<OfferId>,

    pub payment_card_last4: Option<String>,
    pub payment_card_brand: Option<String>,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl SubscriptionRecord {
    /// Builds a fresh record from a provider snapshot.
    #[allow(clippy::too_many_arguments)]
    pub fn from_snapshot(
        member_id: MemberId,
        snapshot: &SubscriptionSnapshot,
        price: &PriceSnapshot,
        product_id: Option<ProductId>,
        offer_id: Option<OfferId>,
        mrr: i64,
        payment_method: Option<&PaymentMethod>,
    ) -> Self {
        let now = Timestamp::now();

        Self {
            id: SubscriptionRecordId::new(),
            member_id,
            customer_id: snapshot.customer_id.clone(),
            subscription_id: snapshot.id.clone(),
            price_id: price.id.clone(),
            product_id,
            plan_nickname: price.nickname.clone(),
            plan_interval: price.interval.clone(),
            plan_amount: price.unit_amount,
            plan_currency: price.currency.clone(),
            status: snapshot.status,
            cancel_at_period_end: snapshot.cancel_at_period_end,
            cancellation_reason: snapshot.cancellation_reason.clone(),
            start_date: Timestamp::from_unix_secs(snapshot.start_date),
            current_period_end: Timestamp::from_unix_secs(snapshot.current_period_end),
            trial_start_at: snapshot.trial_start.map(Timestamp::from_unix_secs),
            trial_end_at: snapshot.trial_end.map(Timestamp::from_unix_secs),
            mrr,
            offer_id,
            payment_card_last4: payment_method.and_then(|pm| pm.card_last4.clone()),
            payment_card_brand: payment_method.and_then(|pm| pm.card_brand.clone()),
            created_at: now,
            updated_at: now,
        }
    }

    /// Carries identity and sticky fields over from the stored row.
    pub fn merged_with(mut self, previous: &SubscriptionRecord) -> Self {
        self.id = previous.id;
        self.created_at = previous.created_at;
        if self.offer_id.is_none() {
            self.offer_id = previous.offer_id;
        }
        if self.product_id.is_none() {
            self.product_id = previous.product_id;
        }
        self
    }

    /// True when a field that drives lifecycle events differs.
    pub fn differs_materially(&self, other: &SubscriptionRecord) -> bool {
        self.mrr != other.mrr
            || self.price_id != other.price_id
            || self.status != other.status
            || self.cancel_at_period_end != other.cancel_at_period_end
    }

    pub fn label(&self) -> SubscriptionLabel {
        SubscriptionLabel::resolve(self.status, self.cancel_at_period_end)
    }

    /// Whether the subscription currently grants access to its product.
    ///
    /// A scheduled cancellation keeps granting access until the provider
    /// reports the subscription canceled.
    pub fn grants_access(&self) -> bool {
        self.status.is_active_class()
    }

    pub fn is_complimentary(&self) -> bool {
        self.plan_nickname
            .as_deref()
            .map(|n| n.eq_ignore_ascii_case("complimentary"))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::fixtures;

    fn record(status: SubscriptionStatus) -> SubscriptionRecord {
        let price = fixtures::price("price_gold", 500, "month");
        let snapshot = fixtures::snapshot(status, price.clone());
        SubscriptionRecord::from_snapshot(MemberId::new(), &snapshot, &price, None, None, 500, None)
    }

    #[test]
    fn from_snapshot_copies_provider_fields() {
        let price = fixtures::price("price_gold", 500, "month");
        let mut snapshot = fixtures::snapshot(SubscriptionStatus::Active, price.clone());
        snapshot.trial_end = Some(1_700_100_000);
        let payment = PaymentMethod {
            id: "pm_1".to_string(),
            card_brand: Some("visa".to_string()),
            card_last4: Some("4242".to_string()),
        };

        let record = SubscriptionRecord::from_snapshot(
            MemberId::new(),
            &snapshot,
            &price,
            None,
            None,
            500,
            Some(&payment),
        );

        assert_eq!(record.subscription_id, "sub_1");
        assert_eq!(record.customer_id, "cus_1");
        assert_eq!(record.price_id, "price_gold");
        assert_eq!(record.start_date.as_unix_secs(), 1_700_000_000);
        assert_eq!(record.trial_end_at.map(|t| t.as_unix_secs()), Some(1_700_100_000));
        assert_eq!(record.payment_card_last4.as_deref(), Some("4242"));
    }

    #[test]
    fn merge_keeps_identity_and_sticky_offer() {
        let mut previous = record(SubscriptionStatus::Active);
        previous.offer_id = Some(OfferId::new());

        let next = record(SubscriptionStatus::Active).merged_with(&previous);

        assert_eq!(next.id, previous.id);
        assert_eq!(next.created_at, previous.created_at);
        assert_eq!(next.offer_id, previous.offer_id);
    }

    #[test]
    fn merge_prefers_new_offer_when_present() {
        let mut previous = record(SubscriptionStatus::Active);
        previous.offer_id = Some(OfferId::new());

        let mut next = record(SubscriptionStatus::Active);
        let new_offer = OfferId::new();
        next.offer_id = Some(new_offer);

        assert_eq!(next.merged_with(&previous).offer_id, Some(new_offer));
    }

    #[test]
    fn material_difference_ignores_bookkeeping_fields() {
        let a = record(SubscriptionStatus::Active);
        let mut b = a.clone();
        b.payment_card_last4 = Some("0000".to_string());
        b.updated_at = b.updated_at.add_days(1);
        assert!(!a.differs_materially(&b));

        b.cancel_at_period_end = true;
        assert!(a.differs_materially(&b));
    }

    #[test]
    fn scheduled_cancellation_still_grants_access() {
        let mut r = record(SubscriptionStatus::Active);
        r.cancel_at_period_end = true;
        assert!(r.grants_access());
        assert_eq!(r.label(), SubscriptionLabel::Canceled);

        r.status = SubscriptionStatus::Canceled;
        assert!(!r.grants_access());
    }
}
