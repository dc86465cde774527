//! Billing module - the provider's view of a subscription.
//!
//! Snapshot value types, the MRR calculator and lifecycle classification.
//! Everything here is pure; nothing performs I/O.

mod errors;
mod lifecycle;
mod mrr;
mod snapshot;

pub use errors::{BillingError, BillingErrorCode};
pub use lifecycle::{SubscriptionLabel, TransitionKind};
pub use mrr::{compute_mrr, BillingInterval, MrrError};
pub use snapshot::{
    Coupon, CouponDuration, Discount, PaymentMethod, PriceSnapshot, SubscriptionItem,
    SubscriptionSnapshot, SubscriptionStatus,
};

#[cfg(test)]
pub(crate) use snapshot::fixtures;
