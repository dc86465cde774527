//! Errors reported by the billing provider.

use serde::{Deserialize, Serialize};

/// Errors from billing provider operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingError {
    /// Error code for categorization.
    pub code: BillingErrorCode,

    /// Human-readable message.
    pub message: String,

    /// Provider's error code (if available).
    pub provider_code: Option<String>,

    /// Whether the operation can be retried.
    pub retryable: bool,
}

impl BillingError {
    /// Create a new billing error.
    pub fn new(code: BillingErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider_code: None,
            retryable: code.is_retryable(),
        }
    }

    /// Create with provider code.
    pub fn with_provider_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(BillingErrorCode::NetworkError, message)
    }

    /// Create an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(BillingErrorCode::AuthenticationError, message)
    }

    /// Create a not found error.
    pub fn not_found(resource: &str, id: &str) -> Self {
        Self::new(
            BillingErrorCode::NotFound,
            format!("{} '{}' not found", resource, id),
        )
    }

    /// Create an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(BillingErrorCode::InvalidRequest, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.code == BillingErrorCode::NotFound
    }
}

impl std::fmt::Display for BillingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for BillingError {}

/// Billing error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingErrorCode {
    /// Network connectivity issue.
    NetworkError,

    /// API authentication failed.
    AuthenticationError,

    /// Resource not found.
    NotFound,

    /// Rate limit exceeded.
    RateLimited,

    /// Provider returned a 5xx.
    ProviderUnavailable,

    /// Request rejected by the provider.
    InvalidRequest,

    /// Response could not be understood.
    Unknown,
}

impl BillingErrorCode {
    /// Check if this error type is typically retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BillingErrorCode::NetworkError
                | BillingErrorCode::RateLimited
                | BillingErrorCode::ProviderUnavailable
        )
    }
}

impl std::fmt::Display for BillingErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BillingErrorCode::NetworkError => "network_error",
            BillingErrorCode::AuthenticationError => "authentication_error",
            BillingErrorCode::NotFound => "not_found",
            BillingErrorCode::RateLimited => "rate_limited",
            BillingErrorCode::ProviderUnavailable => "provider_unavailable",
            BillingErrorCode::InvalidRequest => "invalid_request",
            BillingErrorCode::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_retryable() {
        assert!(BillingError::network("reset").retryable);
        assert!(BillingError::new(BillingErrorCode::RateLimited, "slow down").retryable);
        assert!(BillingError::new(BillingErrorCode::ProviderUnavailable, "503").retryable);
    }

    #[test]
    fn not_found_is_terminal() {
        let err = BillingError::not_found("subscription", "sub_1");
        assert!(!err.retryable);
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "not_found: subscription 'sub_1' not found");
    }
}
