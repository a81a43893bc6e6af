//! ConfirmOrderHandler - Turns a verified payment into membership state.
//!
//! Runs as one transaction:
//!
//! 1. lock the order; a confirmed order ends here as a benign duplicate
//! 2. lock the buyer's membership and re-classify against it
//! 3. compute the window, build invoices, project the membership
//! 4. write order, invoices, carry-over stamps, snapshot and membership
//!
//! Any failure rolls everything back.

use std::sync::Arc;

use crate::config::BillingConfig;
use crate::domain::foundation::Timestamp;
use crate::domain::membership::{
    Invoice, InvoiceFactory, Membership, MembershipProjector, MembershipSnapshot, Order,
    OrderClassifier, OrderKind, PaymentResult, PurchasedWindowCalculator, ReviewReason,
    SnapshotReason, SubscriptionError,
};
use crate::ports::{SubscriptionStore, SubscriptionTransaction};

use super::transaction::finish;

/// Everything a confirmation wrote.
#[derive(Debug, Clone)]
pub struct ConfirmOrderResult {
    pub order: Order,
    /// Purchase invoice first, then the carry-over if any.
    pub invoices: Vec<Invoice>,
    pub membership: Membership,
    /// Archived prior membership, absent for a first purchase.
    pub snapshot: Option<MembershipSnapshot>,
    /// Set when calibration needs a human to look at the outcome.
    pub review: Option<ReviewReason>,
}

/// Handler for payment confirmations.
///
/// Safe to call repeatedly for the same order: only the first call that
/// wins the order lock changes state.
pub struct ConfirmOrderHandler {
    store: Arc<dyn SubscriptionStore>,
    classifier: OrderClassifier,
}

impl ConfirmOrderHandler {
    pub fn new(store: Arc<dyn SubscriptionStore>, classifier: OrderClassifier) -> Self {
        Self { store, classifier }
    }

    /// Handler calibrating with the same renewal ceiling checkout uses.
    pub fn from_config(store: Arc<dyn SubscriptionStore>, billing: &BillingConfig) -> Self {
        Self::new(store, billing.classifier())
    }

    pub async fn handle(
        &self,
        payment: PaymentResult,
    ) -> Result<ConfirmOrderResult, SubscriptionError> {
        let mut tx = self.store.begin().await?;
        let outcome = self.confirm(tx.as_mut(), &payment).await;
        let result = finish(tx, outcome).await;

        match &result {
            Ok(confirmed) => tracing::info!(
                order_id = %confirmed.order.id,
                user_id = %confirmed.order.user_id,
                kind = %confirmed.order.kind,
                invoices = confirmed.invoices.len(),
                expires_at = %confirmed.membership.expires_at,
                "Order confirmed"
            ),
            Err(err) if err.is_benign() => tracing::info!(
                order_id = %payment.order_id,
                "Duplicate confirmation ignored"
            ),
            Err(err @ SubscriptionError::InvoiceBuild(_)) => tracing::error!(
                order_id = %payment.order_id,
                error = %err,
                "Confirmation rolled back"
            ),
            Err(err) => tracing::warn!(
                order_id = %payment.order_id,
                error = %err,
                "Confirmation rolled back"
            ),
        }

        result
    }

    async fn confirm(
        &self,
        tx: &mut dyn SubscriptionTransaction,
        payment: &PaymentResult,
    ) -> Result<ConfirmOrderResult, SubscriptionError> {
        let at = payment.confirmed_at;

        // 1. Lock the order and check it is still open
        let mut order = tx
            .lock_order(&payment.order_id)
            .await?
            .ok_or(SubscriptionError::OrderNotFound(payment.order_id))?;
        if order.is_confirmed() {
            return Err(SubscriptionError::AlreadyConfirmed(order.id));
        }
        if payment.amount_paid != order.charged_amount {
            return Err(SubscriptionError::validation(
                "amount_paid",
                format!(
                    "paid {} but order {} charges {}",
                    payment.amount_paid, order.id, order.charged_amount
                ),
            ));
        }

        // 2. Re-classify against the locked membership
        let current = tx.lock_membership(&order.user_id).await?;
        let calibration = self.classifier.calibrate(&order, current.as_ref(), at);
        if calibration.changed {
            tracing::info!(
                order_id = %order.id,
                from = %order.kind,
                to = %calibration.kind,
                "Order kind recalibrated"
            );
        }
        if let Some(review) = &calibration.review {
            tracing::warn!(
                order_id = %order.id,
                user_id = %order.user_id,
                review = ?review,
                "Order flagged for manual review"
            );
        }

        // 3. Window, invoices, projection
        let window = PurchasedWindowCalculator::compute(
            calibration.kind,
            at,
            current.as_ref().map(|m| m.expires_at),
            &order.period,
        )
        .map_err(|err| match err {
            SubscriptionError::InvalidOrderKind(kind) => SubscriptionError::invoice_build(
                format!("no window for {} order {}", kind, order.id),
            ),
            other => other,
        })?;
        order.confirm(calibration.kind, at, window)?;

        let prior = if order.kind == OrderKind::Upgrade {
            tx.list_invoices(&order.user_id).await?
        } else {
            Vec::new()
        };
        let invoices = InvoiceFactory::for_confirmation(&order, current.as_ref(), &prior, at)?;

        let membership = match current.clone() {
            Some(m) => invoices
                .in_application_order()
                .fold(m, MembershipProjector::apply),
            None => MembershipProjector::create(order.user_id.clone(), &invoices.purchase)?,
        };
        let snapshot = current.as_ref().map(|m| {
            MembershipSnapshot::archive(m, SnapshotReason::Order(order.kind), Some(order.id), at)
        });

        // 4. Writes
        tx.update_order(&order).await?;
        for invoice in invoices.in_application_order() {
            tx.insert_invoice(invoice).await?;
        }
        if !invoices.carried_over.is_empty() {
            tx.stamp_carried_over(&invoices.carried_over, at).await?;
            tracing::info!(
                order_id = %order.id,
                stamped = invoices.carried_over.len(),
                "Invoices carried over"
            );
        }
        if let Some(snapshot) = &snapshot {
            tx.archive_membership(snapshot).await?;
        }
        tx.save_membership(&membership).await?;

        Ok(ConfirmOrderResult {
            invoices: invoices.in_application_order().cloned().collect(),
            order,
            membership,
            snapshot,
            review: calibration.review,
        })
    }
}
