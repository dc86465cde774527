//! Recoverable degradations.
//!
//! A degradation is a step that failed without failing the operation. The
//! operation proceeds with a fallback and reports what it gave up.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradationKind {
    /// Fresh subscription state could not be fetched; the supplied snapshot was used.
    SubscriptionRefresh,
    /// Card details could not be fetched; stored as null.
    PaymentMethod,
    /// The price matched no product; a default product or none was used.
    ProductLink,
    /// The entitlement write failed; only the status was stored.
    EntitlementWrite,
    /// Billing customer email could not be synchronised.
    EmailSync,
}

impl DegradationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DegradationKind::SubscriptionRefresh => "subscription_refresh",
            DegradationKind::PaymentMethod => "payment_method",
            DegradationKind::ProductLink => "product_link",
            DegradationKind::EntitlementWrite => "entitlement_write",
            DegradationKind::EmailSync => "email_sync",
        }
    }
}

/// What was given up, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Degradation {
    pub kind: DegradationKind,
    pub message: String,
}

impl Degradation {
    pub fn new(kind: DegradationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Degradation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}
