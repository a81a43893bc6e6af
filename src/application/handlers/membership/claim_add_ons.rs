//! ClaimAddOnsHandler - Activates reserved add-on days on a lapsed membership.

use std::sync::Arc;

use crate::domain::foundation::{Timestamp, UserId};
use crate::domain::membership::{
    AddOnActivation, AddOnAggregator, MembershipSnapshot, SnapshotReason, SubscriptionError,
};
use crate::ports::{SubscriptionStore, SubscriptionTransaction};

use super::transaction::finish;

#[derive(Debug, Clone)]
pub struct ClaimAddOnsCommand {
    pub user_id: UserId,
    pub requested_at: Timestamp,
}

#[derive(Debug, Clone)]
pub struct ClaimAddOnsResult {
    pub activation: AddOnActivation,
    pub snapshot: MembershipSnapshot,
}

/// Handler for add-on claims.
///
/// Claims one tier per call, highest first. Callers wanting every reserved
/// day activated call again once the claimed window has run out.
pub struct ClaimAddOnsHandler {
    store: Arc<dyn SubscriptionStore>,
}

impl ClaimAddOnsHandler {
    pub fn new(store: Arc<dyn SubscriptionStore>) -> Self {
        Self { store }
    }

    /// Returns `None` when nothing is reserved.
    pub async fn handle(
        &self,
        cmd: ClaimAddOnsCommand,
    ) -> Result<Option<ClaimAddOnsResult>, SubscriptionError> {
        let mut tx = self.store.begin().await?;
        let outcome = self.claim(tx.as_mut(), &cmd).await;
        let result = finish(tx, outcome).await?;

        if let Some(claimed) = &result {
            tracing::info!(
                user_id = %cmd.user_id,
                tier = %claimed.activation.tier.as_str(),
                days = claimed.activation.total_days,
                invoices = claimed.activation.invoices.len(),
                expires_at = %claimed.activation.membership.expires_at,
                "Add-ons claimed"
            );
        }
        Ok(result)
    }

    async fn claim(
        &self,
        tx: &mut dyn SubscriptionTransaction,
        cmd: &ClaimAddOnsCommand,
    ) -> Result<Option<ClaimAddOnsResult>, SubscriptionError> {
        let at = cmd.requested_at;

        let membership = tx
            .lock_membership(&cmd.user_id)
            .await?
            .ok_or_else(|| SubscriptionError::MembershipNotFound(cmd.user_id.clone()))?;
        if !membership.is_expired(at) {
            return Err(SubscriptionError::validation(
                "membership",
                format!("membership {} is still active", membership.id),
            ));
        }

        let invoices = tx.list_invoices(&cmd.user_id).await?;
        let Some(group) = AddOnAggregator::next_claim(AddOnAggregator::group_and_reduce(&invoices))
        else {
            return Ok(None);
        };

        let snapshot =
            MembershipSnapshot::archive(&membership, SnapshotReason::AddOnClaim, None, at);
        let activation = AddOnAggregator::activate(membership, group, at)?;

        for invoice in &activation.invoices {
            tx.update_invoice(invoice).await?;
        }
        tx.archive_membership(&snapshot).await?;
        tx.save_membership(&activation.membership).await?;

        Ok(Some(ClaimAddOnsResult {
            activation,
            snapshot,
        }))
    }
}
