//! Lifecycle classification of billing subscriptions.
//!
//! The label is a coarse view of the raw provider status. Comparing the label
//! of a previous snapshot with the label of the new one gives the subtype
//! carried by `subscription.lifecycle` events.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::SubscriptionStatus;

/// Derived state of a subscription, independent of the provider's wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionLabel {
    Active,
    /// Still running but scheduled to lapse at period end.
    Canceled,
    /// Ended at the provider.
    Expired,
    Inactive,
}

impl SubscriptionLabel {
    /// Classifies a raw status plus the scheduled-cancellation flag.
    pub fn resolve(status: SubscriptionStatus, cancel_at_period_end: bool) -> Self {
        if status == SubscriptionStatus::Canceled {
            SubscriptionLabel::Expired
        } else if cancel_at_period_end {
            SubscriptionLabel::Canceled
        } else if status.is_active_class() {
            SubscriptionLabel::Active
        } else {
            SubscriptionLabel::Inactive
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionLabel::Active => "active",
            SubscriptionLabel::Canceled => "canceled",
            SubscriptionLabel::Expired => "expired",
            SubscriptionLabel::Inactive => "inactive",
        }
    }
}

impl fmt::Display for SubscriptionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subtype of a lifecycle event between two snapshots of one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Updated,
    Reactivated,
    Active,
    Canceled,
    Expired,
    Inactive,
}

impl TransitionKind {
    /// Classifies the move from `previous` to `next`.
    pub fn classify(previous: SubscriptionLabel, next: SubscriptionLabel) -> Self {
        if previous == next {
            return TransitionKind::Updated;
        }

        match (previous, next) {
            (SubscriptionLabel::Expired | SubscriptionLabel::Canceled, SubscriptionLabel::Active) => {
                TransitionKind::Reactivated
            }
            (_, SubscriptionLabel::Active) => TransitionKind::Active,
            (_, SubscriptionLabel::Canceled) => TransitionKind::Canceled,
            (_, SubscriptionLabel::Expired) => TransitionKind::Expired,
            (_, SubscriptionLabel::Inactive) => TransitionKind::Inactive,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionKind::Updated => "updated",
            TransitionKind::Reactivated => "reactivated",
            TransitionKind::Active => "active",
            TransitionKind::Canceled => "canceled",
            TransitionKind::Expired => "expired",
            TransitionKind::Inactive => "inactive",
        }
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
