//! Monthly recurring revenue calculator.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::{Discount, SubscriptionStatus};

/// Errors from MRR computation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MrrError {
    #[error("Unknown billing interval '{0}'")]
    UnknownInterval(String),
}

/// Recurring interval of a price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BillingInterval {
    Day,
    Week,
    Month,
    Year,
}

impl BillingInterval {
    /// Monthly equivalent of `amount` charged once per interval.
    pub fn monthly_equivalent(&self, amount: i64) -> i64 {
        match self {
            BillingInterval::Year => amount.div_euclid(12),
            BillingInterval::Month => amount,
            BillingInterval::Week => amount * 4,
            BillingInterval::Day => amount * 30,
        }
    }
}

impl FromStr for BillingInterval {
    type Err = MrrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(BillingInterval::Day),
            "week" => Ok(BillingInterval::Week),
            "month" => Ok(BillingInterval::Month),
            "year" => Ok(BillingInterval::Year),
            other => Err(MrrError::UnknownInterval(other.to_string())),
        }
    }
}

impl fmt::Display for BillingInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BillingInterval::Day => "day",
            BillingInterval::Week => "week",
            BillingInterval::Month => "month",
            BillingInterval::Year => "year",
        };
        f.write_str(s)
    }
}

/// Computes the monthly recurring revenue of a subscription, in minor units.
///
/// Zero-revenue statuses and scheduled cancellations return 0 before the
/// interval is looked at. Only forever discounts are applied.
///
/// # Errors
///
/// `UnknownInterval` when a revenue-bearing subscription has an interval
/// outside day/week/month/year.
pub fn compute_mrr(
    interval: &str,
    amount: i64,
    status: SubscriptionStatus,
    cancel_at_period_end: bool,
    discount: Option<&Discount>,
) -> Result<i64, MrrError> {
    if status.is_zero_revenue() || cancel_at_period_end {
        return Ok(0);
    }

    let interval: BillingInterval = interval.parse()?;

    let amount = match discount.filter(|d| d.is_forever()) {
        Some(discount) => apply_discount(amount, discount),
        None => amount,
    };

    Ok(interval.monthly_equivalent(amount))
}

fn apply_discount(amount: i64, discount: &Discount) -> i64 {
    if let Some(off) = discount.coupon.amount_off {
        return (amount - off).max(0);
    }
    if let Some(percent) = discount.coupon.percent_off {
        let discounted = (amount as f64 * (100.0 - percent) / 100.0).round() as i64;
        return discounted.max(0);
    }
    amount
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::{Coupon, CouponDuration};
    use proptest::prelude::*;

    fn forever_percent(percent: f64) -> Discount {
        Discount {
            coupon: Coupon {
                id: "pct".to_string(),
                duration: CouponDuration::Forever,
                percent_off: Some(percent),
                amount_off: None,
            },
            end: None,
        }
    }

    fn forever_amount(off: i64) -> Discount {
        Discount {
            coupon: Coupon {
                id: "amt".to_string(),
                duration: CouponDuration::Forever,
                percent_off: None,
                amount_off: Some(off),
            },
            end: None,
        }
    }

    #[test]
    fn monthly_amount_is_unchanged() {
        let mrr = compute_mrr("month", 500, SubscriptionStatus::Active, false, None).unwrap();
        assert_eq!(mrr, 500);
    }

    #[test]
    fn yearly_amount_is_floored_twelfth() {
        let mrr = compute_mrr("year", 5000, SubscriptionStatus::Active, false, None).unwrap();
        assert_eq!(mrr, 416);
    }

    #[test]
    fn weekly_and_daily_are_scaled() {
        assert_eq!(
            compute_mrr("week", 100, SubscriptionStatus::Active, false, None).unwrap(),
            400
        );
        assert_eq!(
            compute_mrr("day", 10, SubscriptionStatus::PastDue, false, None).unwrap(),
            300
        );
    }

    #[test]
    fn forever_half_off_on_twenty_dollars_monthly_is_ten() {
        let discount = forever_percent(50.0);
        let mrr =
            compute_mrr("month", 2000, SubscriptionStatus::Active, false, Some(&discount)).unwrap();
        assert_eq!(mrr, 1000);
    }

    #[test]
    fn percent_off_rounds_to_nearest_minor_unit() {
        let discount = forever_percent(33.0);
        // 999 * 0.67 = 669.33
        let mrr =
            compute_mrr("month", 999, SubscriptionStatus::Active, false, Some(&discount)).unwrap();
        assert_eq!(mrr, 669);
    }

    #[test]
    fn amount_off_is_floored_at_zero() {
        let discount = forever_amount(800);
        let mrr =
            compute_mrr("month", 500, SubscriptionStatus::Active, false, Some(&discount)).unwrap();
        assert_eq!(mrr, 0);

        let discount = forever_amount(200);
        let mrr =
            compute_mrr("month", 500, SubscriptionStatus::Active, false, Some(&discount)).unwrap();
        assert_eq!(mrr, 300);
    }

    #[test]
    fn discount_applies_before_interval_normalization() {
        let discount = forever_amount(1200);
        let mrr =
            compute_mrr("year", 6000, SubscriptionStatus::Active, false, Some(&discount)).unwrap();
        assert_eq!(mrr, 400);
    }

    #[test]
    fn temporary_discounts_are_ignored() {
        let mut discount = forever_percent(50.0);
        discount.coupon.duration = CouponDuration::Repeating;
        let mrr =
            compute_mrr("month", 2000, SubscriptionStatus::Active, false, Some(&discount)).unwrap();
        assert_eq!(mrr, 2000);

        let mut discount = forever_percent(50.0);
        discount.end = Some(1_900_000_000);
        let mrr =
            compute_mrr("month", 2000, SubscriptionStatus::Active, false, Some(&discount)).unwrap();
        assert_eq!(mrr, 2000);
    }

    #[test]
    fn cancel_at_period_end_contributes_nothing() {
        let mrr = compute_mrr("month", 500, SubscriptionStatus::Active, true, None).unwrap();
        assert_eq!(mrr, 0);
    }

    #[test]
    fn unknown_interval_is_an_error() {
        let result = compute_mrr("fortnight", 500, SubscriptionStatus::Active, false, None);
        assert_eq!(result, Err(MrrError::UnknownInterval("fortnight".to_string())));
    }

    #[test]
    fn zero_revenue_status_short_circuits_before_interval_check() {
        let mrr = compute_mrr("fortnight", 500, SubscriptionStatus::Canceled, false, None).unwrap();
        assert_eq!(mrr, 0);
    }

    fn any_status() -> impl Strategy<Value = SubscriptionStatus> {
        prop_oneof![
            Just(SubscriptionStatus::Active),
            Just(SubscriptionStatus::Trialing),
            Just(SubscriptionStatus::PastDue),
            Just(SubscriptionStatus::Unpaid),
            Just(SubscriptionStatus::Canceled),
            Just(SubscriptionStatus::Incomplete),
            Just(SubscriptionStatus::IncompleteExpired),
            Just(SubscriptionStatus::Paused),
        ]
    }

    fn any_interval() -> impl Strategy<Value = &'static str> {
        prop_oneof![Just("day"), Just("week"), Just("month"), Just("year")]
    }

    proptest! {
        #[test]
        fn zero_revenue_statuses_always_yield_zero(
            interval in any_interval(),
            amount in 0i64..1_000_000,
            cancel in any::<bool>(),
            percent in 0.0f64..100.0,
        ) {
            let discount = forever_percent(percent);
            for status in [
                SubscriptionStatus::Trialing,
                SubscriptionStatus::Incomplete,
                SubscriptionStatus::IncompleteExpired,
                SubscriptionStatus::Canceled,
            ] {
                prop_assert_eq!(compute_mrr(interval, amount, status, cancel, Some(&discount)), Ok(0));
            }
        }

        #[test]
        fn scheduled_cancellation_always_yields_zero(
            interval in any_interval(),
            amount in 0i64..1_000_000,
            status in any_status(),
        ) {
            prop_assert_eq!(compute_mrr(interval, amount, status, true, None), Ok(0));
        }

        #[test]
        fn mrr_is_deterministic_and_non_negative(
            interval in any_interval(),
            amount in 0i64..1_000_000,
            status in any_status(),
            cancel in any::<bool>(),
            off in 0i64..2_000_000,
        ) {
            let discount = forever_amount(off);
            let first = compute_mrr(interval, amount, status, cancel, Some(&discount));
            let second = compute_mrr(interval, amount, status, cancel, Some(&discount));
            prop_assert_eq!(&first, &second);
            prop_assert!(first.unwrap() >= 0);
        }
    }
}
