//! Subscription store port.
//!
//! Entry point to persisted orders, invoices and memberships. Reads here take
//! no locks and are used at checkout. Every state change that moves money or
//! access runs inside a [`SubscriptionTransaction`] obtained from `begin`.
//!
//! # Example
//!
//! ```ignore
//! async fn expiration_of(
//!     store: &dyn SubscriptionStore,
//!     user_id: &UserId,
//! ) -> Result<Option<Timestamp>, DomainError> {
//!     Ok(store.find_membership(user_id).await?.map(|m| m.expires_at))
//! }
//! ```

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, OrderId, UserId};
use crate::domain::membership::{Invoice, Membership, MembershipSnapshot, Order};

use super::SubscriptionTransaction;

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Opens a transaction.
    ///
    /// # Errors
    ///
    /// - `DatabaseError` if no connection could be acquired
    async fn begin(&self) -> Result<Box<dyn SubscriptionTransaction>, DomainError>;

    /// Current membership of a buyer, read without locking.
    async fn find_membership(&self, user_id: &UserId) -> Result<Option<Membership>, DomainError>;

    async fn find_order(&self, id: &OrderId) -> Result<Option<Order>, DomainError>;

    /// Persists a new, unconfirmed order.
    ///
    /// # Errors
    ///
    /// - `ValidationFailed` if an order with the same id exists
    /// - `DatabaseError` on persistence failure
    async fn save_order(&self, order: &Order) -> Result<(), DomainError>;

    /// All invoices of a buyer, oldest first.
    async fn list_invoices(&self, user_id: &UserId) -> Result<Vec<Invoice>, DomainError>;

    /// Archived membership values of a buyer, oldest first.
    async fn list_snapshots(&self, user_id: &UserId)
        -> Result<Vec<MembershipSnapshot>, DomainError>;
}
