//! Foundation module - Shared domain primitives.
//!
//! Contains value objects, identifiers, calendar arithmetic, and error types
//! that form the vocabulary of the paywall domain.

mod errors;
mod ids;
mod period;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{InvoiceId, MembershipId, OfferId, OrderId, PriceId, SnapshotId, UserId};
pub use period::{DateWindow, YearMonthDay, DAYS_PER_MONTH, DAYS_PER_YEAR};
pub use timestamp::Timestamp;
