//! In-memory subscription store.
//!
//! Emulates the PostgreSQL adapter's transaction semantics: a transaction
//! holds the store's lock from `begin` until commit or rollback, works on a
//! private copy, and publishes the copy only on commit. Locking is coarser
//! than row locks (one buyer's transaction blocks another's) which keeps
//! every interleaving serializable.
//!
//! Unlocked reads wait for any open transaction to finish.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::foundation::{DomainError, ErrorCode, InvoiceId, OrderId, Timestamp, UserId};
use crate::domain::membership::{Invoice, Membership, MembershipSnapshot, Order};
use crate::ports::{SubscriptionStore, SubscriptionTransaction};

/// Write that should fail once, for exercising rollback paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    UpdateOrder,
    InsertInvoice,
    StampCarriedOver,
    SaveMembership,
    ArchiveMembership,
    Commit,
}

#[derive(Debug, Clone, Default)]
struct State {
    orders: HashMap<OrderId, Order>,
    memberships: HashMap<UserId, Membership>,
    invoices: Vec<Invoice>,
    snapshots: Vec<MembershipSnapshot>,
}

/// Store backed by process memory.
///
/// # Example
///
/// ```ignore
/// let store = Arc::new(InMemorySubscriptionStore::new());
/// store.inject_failure(FailPoint::Commit).await;
/// // the next transaction fails to commit and leaves no trace
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemorySubscriptionStore {
    state: Arc<Mutex<State>>,
    pending_failure: Arc<Mutex<Option<FailPoint>>>,
}

impl InMemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next transaction fail at `point`.
    pub async fn inject_failure(&self, point: FailPoint) {
        *self.pending_failure.lock().await = Some(point);
    }

    // === Test Helpers ===

    /// Stores a membership directly, bypassing confirmation.
    pub async fn seed_membership(&self, membership: Membership) {
        let mut state = self.state.lock().await;
        state.memberships.insert(membership.user_id.clone(), membership);
    }

    /// Stores an invoice directly, bypassing confirmation.
    pub async fn seed_invoice(&self, invoice: Invoice) {
        self.state.lock().await.invoices.push(invoice);
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn begin(&self) -> Result<Box<dyn SubscriptionTransaction>, DomainError> {
        let failure = self.pending_failure.lock().await.take();
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = (*guard).clone();
        Ok(Box::new(InMemoryTransaction {
            guard,
            working,
            failure,
        }))
    }

    async fn find_membership(&self, user_id: &UserId) -> Result<Option<Membership>, DomainError> {
        Ok(self.state.lock().await.memberships.get(user_id).cloned())
    }

    async fn find_order(&self, id: &OrderId) -> Result<Option<Order>, DomainError> {
        Ok(self.state.lock().await.orders.get(id).cloned())
    }

    async fn save_order(&self, order: &Order) -> Result<(), DomainError> {
        let mut state = self.state.lock().await;
        if state.orders.contains_key(&order.id) {
            return Err(DomainError::new(
                ErrorCode::ValidationFailed,
                format!("Order already exists: {}", order.id),
            ));
        }
        state.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn list_invoices(&self, user_id: &UserId) -> Result<Vec<Invoice>, DomainError> {
        let state = self.state.lock().await;
        Ok(invoices_of(&state, user_id))
    }

    async fn list_snapshots(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<MembershipSnapshot>, DomainError> {
        let state = self.state.lock().await;
        Ok(state
            .snapshots
            .iter()
            .filter(|s| &s.membership.user_id == user_id)
            .cloned()
            .collect())
    }
}

fn invoices_of(state: &State, user_id: &UserId) -> Vec<Invoice> {
    let mut invoices: Vec<Invoice> = state
        .invoices
        .iter()
        .filter(|inv| &inv.user_id == user_id)
        .cloned()
        .collect();
    invoices.sort_by_key(|inv| inv.created_at);
    invoices
}

/// Transaction over [`InMemorySubscriptionStore`].
pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<State>,
    working: State,
    failure: Option<FailPoint>,
}

impl InMemoryTransaction {
    fn trip(&mut self, point: FailPoint) -> Result<(), DomainError> {
        if self.failure == Some(point) {
            self.failure = None;
            return Err(DomainError::database(format!("Injected failure at {:?}", point)));
        }
        Ok(())
    }
}

#[async_trait]
impl SubscriptionTransaction for InMemoryTransaction {
    async fn lock_order(&mut self, id: &OrderId) -> Result<Option<Order>, DomainError> {
        Ok(self.working.orders.get(id).cloned())
    }

    async fn lock_membership(
        &mut self,
        user_id: &UserId,
    ) -> Result<Option<Membership>, DomainError> {
        Ok(self.working.memberships.get(user_id).cloned())
    }

    async fn list_invoices(&mut self, user_id: &UserId) -> Result<Vec<Invoice>, DomainError> {
        Ok(invoices_of(&self.working, user_id))
    }

    async fn update_order(&mut self, order: &Order) -> Result<(), DomainError> {
        self.trip(FailPoint::UpdateOrder)?;
        match self.working.orders.get_mut(&order.id) {
            Some(slot) => {
                *slot = order.clone();
                Ok(())
            }
            None => Err(DomainError::new(
                ErrorCode::OrderNotFound,
                format!("Order not found: {}", order.id),
            )),
        }
    }

    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<(), DomainError> {
        self.trip(FailPoint::InsertInvoice)?;
        self.working.invoices.push(invoice.clone());
        Ok(())
    }

    async fn update_invoice(&mut self, invoice: &Invoice) -> Result<(), DomainError> {
        let slot = self
            .working
            .invoices
            .iter_mut()
            .find(|inv| inv.id == invoice.id)
            .ok_or_else(|| {
                DomainError::new(
                    ErrorCode::InvoiceNotFound,
                    format!("Invoice not found: {}", invoice.id),
                )
            })?;
        slot.window = invoice.window;
        slot.consumed_at = invoice.consumed_at;
        Ok(())
    }

    async fn stamp_carried_over(
        &mut self,
        ids: &[InvoiceId],
        at: Timestamp,
    ) -> Result<(), DomainError> {
        self.trip(FailPoint::StampCarriedOver)?;
        for invoice in self
            .working
            .invoices
            .iter_mut()
            .filter(|inv| ids.contains(&inv.id) && inv.carried_over_at.is_none())
        {
            invoice.carried_over_at = Some(at);
        }
        Ok(())
    }

    async fn save_membership(&mut self, membership: &Membership) -> Result<(), DomainError> {
        self.trip(FailPoint::SaveMembership)?;
        self.working
            .memberships
            .insert(membership.user_id.clone(), membership.clone());
        Ok(())
    }

    async fn archive_membership(
        &mut self,
        snapshot: &MembershipSnapshot,
    ) -> Result<(), DomainError> {
        self.trip(FailPoint::ArchiveMembership)?;
        self.working.snapshots.push(snapshot.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        let mut tx = *self;
        tx.trip(FailPoint::Commit)?;
        let InMemoryTransaction {
            mut guard, working, ..
        } = tx;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        Ok(())
    }
}
