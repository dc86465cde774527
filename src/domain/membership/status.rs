//! Membership status resolution.
//!
//! A member's status is derived, never set directly by the reconciler:
//! an active subscription decides it, otherwise the entitlements left after
//! reconciliation do.

use super::{MemberStatus, SubscriptionRecord};

/// What one subscription contributes to membership status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessGrant {
    pub grants_access: bool,
    pub complimentary: bool,
}

impl AccessGrant {
    pub fn of(record: &SubscriptionRecord) -> Self {
        Self {
            grants_access: record.grants_access(),
            complimentary: record.is_complimentary(),
        }
    }
}

/// Resolves membership status.
///
/// * `reconciled` - the subscription being reconciled, if any.
/// * `others` - the member's other subscriptions.
/// * `entitlement_count` - entitlements held after reconciliation.
pub fn resolve_member_status(
    reconciled: Option<AccessGrant>,
    others: &[AccessGrant],
    entitlement_count: usize,
) -> MemberStatus {
    if let Some(grant) = reconciled.filter(|g| g.grants_access) {
        return if grant.complimentary {
            MemberStatus::Comped
        } else {
            MemberStatus::Paid
        };
    }

    let mut active_others = others.iter().filter(|g| g.grants_access).peekable();
    if active_others.peek().is_some() {
        return if active_others.any(|g| !g.complimentary) {
            MemberStatus::Paid
        } else {
            MemberStatus::Comped
        };
    }

    if entitlement_count > 0 {
        MemberStatus::Comped
    } else {
        MemberStatus::Free
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAID: AccessGrant = AccessGrant {
        grants_access: true,
        complimentary: false,
    };
    const COMP: AccessGrant = AccessGrant {
        grants_access: true,
        complimentary: true,
    };
    const LAPSED: AccessGrant = AccessGrant {
        grants_access: false,
        complimentary: false,
    };

    #[test]
    fn active_paid_subscription_is_paid() {
        assert_eq!(resolve_member_status(Some(PAID), &[], 1), MemberStatus::Paid);
    }

    #[test]
    fn active_complimentary_subscription_is_comped() {
        assert_eq!(resolve_member_status(Some(COMP), &[], 1), MemberStatus::Comped);
        assert_eq!(resolve_member_status(Some(COMP), &[PAID], 1), MemberStatus::Comped);
    }

    #[test]
    fn lapsed_subscription_falls_back_to_entitlements() {
        assert_eq!(resolve_member_status(Some(LAPSED), &[], 0), MemberStatus::Free);
        assert_eq!(resolve_member_status(Some(LAPSED), &[], 2), MemberStatus::Comped);
    }

    #[test]
    fn another_active_subscription_keeps_member_paid() {
        assert_eq!(
            resolve_member_status(Some(LAPSED), &[LAPSED, PAID], 0),
            MemberStatus::Paid
        );
        assert_eq!(resolve_member_status(Some(LAPSED), &[COMP], 0), MemberStatus::Comped);
        assert_eq!(resolve_member_status(None, &[COMP, PAID], 0), MemberStatus::Paid);
    }

    #[test]
    fn no_subscriptions_at_all() {
        assert_eq!(resolve_member_status(None, &[], 0), MemberStatus::Free);
        assert_eq!(resolve_member_status(None, &[], 1), MemberStatus::Comped);
    }
}
