//! Subscription-specific error types.
//!
//! Errors raised while classifying, confirming and projecting purchases.
//!
//! | Error | Side effect | Caller treatment |
//! |-------|-------------|------------------|
//! | Validation | none | surface to buyer |
//! | ClassificationDenied | none | surface to buyer |
//! | InvoiceBuild | rolled back | programming error, alert |
//! | AlreadyConfirmed | none | benign no-op (duplicate webhook) |
//! | OrderNotFound / MembershipNotFound | none | surface |
//! | Storage | rolled back | propagate untouched |

use thiserror::Error;

use crate::domain::foundation::{DomainError, ErrorCode, OrderId, UserId, ValidationError};

use super::DenyReason;

/// Errors that occur in the subscription lifecycle.
#[derive(Debug, Clone, Error)]
pub enum SubscriptionError {
    /// Malformed request, e.g. a discount that does not apply.
    #[error("Validation failed for '{field}': {message}")]
    Validation { field: String, message: String },

    /// Purchase is not allowed against the current membership.
    #[error("Purchase denied: {0}")]
    ClassificationDenied(DenyReason),

    /// The order kind cannot produce a purchased window.
    #[error("Invalid order kind: {0}")]
    InvalidOrderKind(String),

    /// Invoice could not be built for a confirmed order.
    #[error("Invoice build failed: {0}")]
    InvoiceBuild(String),

    /// Order was already confirmed by an earlier delivery.
    #[error("Order {0} is already confirmed")]
    AlreadyConfirmed(OrderId),

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("No membership found for user: {0}")]
    MembershipNotFound(UserId),

    /// Storage or lock failure from a port.
    #[error("Storage error: {0}")]
    Storage(DomainError),
}

impl SubscriptionError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        SubscriptionError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn invoice_build(reason: impl Into<String>) -> Self {
        SubscriptionError::InvoiceBuild(reason.into())
    }

    /// Returns the error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            SubscriptionError::Validation { .. } => ErrorCode::ValidationFailed,
            SubscriptionError::ClassificationDenied(_) => ErrorCode::PurchaseDenied,
            SubscriptionError::InvalidOrderKind(_) => ErrorCode::InvalidOrderKind,
            SubscriptionError::InvoiceBuild(_) => ErrorCode::InvoiceBuildFailed,
            SubscriptionError::AlreadyConfirmed(_) => ErrorCode::AlreadyConfirmed,
            SubscriptionError::OrderNotFound(_) => ErrorCode::OrderNotFound,
            SubscriptionError::MembershipNotFound(_) => ErrorCode::MembershipNotFound,
            SubscriptionError::Storage(err) => err.code,
        }
    }

    /// True for duplicate deliveries that must be acknowledged, not retried.
    pub fn is_benign(&self) -> bool {
        matches!(self, SubscriptionError::AlreadyConfirmed(_))
    }

    /// True for failures that may succeed on a later delivery.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SubscriptionError::Storage(_))
    }
}

impl From<DomainError> for SubscriptionError {
    fn from(err: DomainError) -> Self {
        SubscriptionError::Storage(err)
    }
}

impl From<ValidationError> for SubscriptionError {
    fn from(err: ValidationError) -> Self {
        let field = match &err {
            ValidationError::EmptyField { field }
            | ValidationError::OutOfRange { field, .. }
            | ValidationError::InvalidFormat { field, .. } => field.clone(),
        };
        SubscriptionError::validation(field, err.to_string())
    }
}

impl From<SubscriptionError> for DomainError {
    fn from(err: SubscriptionError) -> Self {
        match err {
            SubscriptionError::Storage(inner) => inner,
            other => DomainError::new(other.code(), other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_confirmed_is_benign_and_not_retryable() {
        let err = SubscriptionError::AlreadyConfirmed(OrderId::new());
        assert!(err.is_benign());
        assert!(!err.is_retryable());
        assert_eq!(err.code(), ErrorCode::AlreadyConfirmed);
    }

    #[test]
    fn storage_errors_keep_their_code_and_are_retryable() {
        let err: SubscriptionError = DomainError::new(ErrorCode::LockFailed, "timeout").into();
        assert!(err.is_retryable());
        assert_eq!(err.code(), ErrorCode::LockFailed);
    }

    #[test]
    fn denied_message_includes_reason() {
        let err = SubscriptionError::ClassificationDenied(DenyReason::SubscriptionActive);
        assert!(err.to_string().contains("auto-renewing"));
        assert_eq!(err.code(), ErrorCode::PurchaseDenied);
    }

    #[test]
    fn validation_error_keeps_field_name() {
        let err: SubscriptionError = ValidationError::empty_field("user_id").into();
        assert!(matches!(
            err,
            SubscriptionError::Validation { ref field, .. } if field == "user_id"
        ));
    }

    #[test]
    fn storage_error_round_trips_to_domain_error_unchanged() {
        let original = DomainError::database("connection reset").with_detail("op", "commit");
        let back: DomainError = SubscriptionError::from(original.clone()).into();
        assert_eq!(back.code, original.code);
        assert_eq!(back.details, original.details);
    }

    #[test]
    fn invoice_build_maps_to_domain_error_code() {
        let err: DomainError = SubscriptionError::invoice_build("window overflow").into();
        assert_eq!(err.code, ErrorCode::InvoiceBuildFailed);
    }
}
