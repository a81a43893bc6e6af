//! Row-locked unit of work over subscription state.
//!
//! # Contract
//!
//! - `lock_order` / `lock_membership` hold an exclusive lock on the row until
//!   commit or rollback. Locking a buyer with no membership still serializes
//!   concurrent transactions for that buyer.
//! - Nothing written through a transaction is visible to others before
//!   `commit`. Dropping a transaction without committing rolls it back.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, InvoiceId, OrderId, Timestamp, UserId};
use crate::domain::membership::{Invoice, Membership, MembershipSnapshot, Order};

#[async_trait]
pub trait SubscriptionTransaction: Send {
    /// Locks and reads an order.
    async fn lock_order(&mut self, id: &OrderId) -> Result<Option<Order>, DomainError>;

    /// Locks and reads a buyer's membership.
    async fn lock_membership(&mut self, user_id: &UserId)
        -> Result<Option<Membership>, DomainError>;

    /// Invoices of a buyer as seen by this transaction, oldest first.
    async fn list_invoices(&mut self, user_id: &UserId) -> Result<Vec<Invoice>, DomainError>;

    /// Writes an order's confirmation state.
    ///
    /// # Errors
    ///
    /// - `OrderNotFound` if the order does not exist
    async fn update_order(&mut self, order: &Order) -> Result<(), DomainError>;

    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<(), DomainError>;

    /// Writes an activated add-on's window and consumption time.
    ///
    /// # Errors
    ///
    /// - `InvoiceNotFound` if the invoice does not exist
    async fn update_invoice(&mut self, invoice: &Invoice) -> Result<(), DomainError>;

    /// Sets `carried_over_at` on each listed invoice that has none yet.
    async fn stamp_carried_over(
        &mut self,
        ids: &[InvoiceId],
        at: Timestamp,
    ) -> Result<(), DomainError>;

    /// Inserts or replaces the buyer's membership.
    async fn save_membership(&mut self, membership: &Membership) -> Result<(), DomainError>;

    async fn archive_membership(&mut self, snapshot: &MembershipSnapshot)
        -> Result<(), DomainError>;

    async fn commit(self: Box<Self>) -> Result<(), DomainError>;

    async fn rollback(self: Box<Self>) -> Result<(), DomainError>;
}
