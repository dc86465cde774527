//! Membership error types.
//!
//! # Propagation
//!
//! | Error | Meaning |
//! |-------|---------|
//! | BadRequest | Caller asked for something invalid; abort |
//! | NotFound | Member, subscription, customer or product absent; abort |
//! | Conflict | Lost a duplicate-key race; abort, safe to retry |
//! | Billing | Provider call failed during a critical step; abort |
//! | Infrastructure | Persistence or dispatch failure; abort, safe to retry |
//!
//! Recoverable degradations are not errors; see [`super::Degradation`].

use thiserror::Error;

use crate::domain::billing::{BillingError, MrrError};
use crate::domain::foundation::{DomainError, ErrorCode, ValidationError};

/// Errors returned by membership and subscription operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MembershipError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Billing provider error: {0}")]
    Billing(BillingError),

    #[error("Infrastructure error: {0}")]
    Infrastructure(String),
}

impl MembershipError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        MembershipError::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        MembershipError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        MembershipError::Conflict(message.into())
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        MembershipError::Infrastructure(message.into())
    }

    /// Returns true if the caller may safely retry the whole operation.
    pub fn is_retryable(&self) -> bool {
        match self {
            MembershipError::Conflict(_) | MembershipError::Infrastructure(_) => true,
            MembershipError::Billing(err) => err.retryable,
            MembershipError::BadRequest(_) | MembershipError::NotFound(_) => false,
        }
    }
}

impl From<DomainError> for MembershipError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::Conflict => MembershipError::Conflict(err.message),
            ErrorCode::ValidationFailed => MembershipError::BadRequest(err.message),
            code if code.is_not_found() => MembershipError::NotFound(err.message),
            _ => MembershipError::Infrastructure(err.to_string()),
        }
    }
}

impl From<BillingError> for MembershipError {
    fn from(err: BillingError) -> Self {
        if err.is_not_found() {
            MembershipError::NotFound(err.message)
        } else {
            MembershipError::Billing(err)
        }
    }
}

impl From<ValidationError> for MembershipError {
    fn from(err: ValidationError) -> Self {
        MembershipError::BadRequest(err.to_string())
    }
}

impl From<MrrError> for MembershipError {
    fn from(err: MrrError) -> Self {
        MembershipError::BadRequest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::BillingErrorCode;

    #[test]
    fn domain_conflict_maps_to_conflict() {
        let err: MembershipError = DomainError::new(ErrorCode::Conflict, "taken").into();
        assert_eq!(err, MembershipError::Conflict("taken".to_string()));
    }

    #[test]
    fn domain_not_found_family_maps_to_not_found() {
        let err: MembershipError = DomainError::new(ErrorCode::MemberNotFound, "gone").into();
        assert!(matches!(err, MembershipError::NotFound(_)));
    }

    #[test]
    fn database_errors_are_infrastructure() {
        let err: MembershipError = DomainError::database("connection reset").into();
        assert!(matches!(err, MembershipError::Infrastructure(ref m) if m.contains("connection reset")));
        assert!(err.is_retryable());
    }

    #[test]
    fn billing_not_found_maps_to_not_found() {
        let err: MembershipError = BillingError::not_found("customer", "cus_1").into();
        assert!(matches!(err, MembershipError::NotFound(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn transient_billing_errors_stay_retryable() {
        let err: MembershipError = BillingError::new(BillingErrorCode::RateLimited, "429").into();
        assert!(matches!(err, MembershipError::Billing(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn unknown_interval_is_bad_request() {
        let err: MembershipError = MrrError::UnknownInterval("fortnight".to_string()).into();
        assert!(matches!(err, MembershipError::BadRequest(ref m) if m.contains("fortnight")));
    }
}
