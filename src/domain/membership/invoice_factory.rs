//! Builds invoices for confirmed orders.
//!
//! Every confirmation produces one purchase invoice. An upgrade additionally
//! freezes the old tier's unused paid time into a carry-over add-on invoice,
//! and every earlier invoice still backing that time is stamped carried over
//! in the same transaction so the time is never counted twice.

use crate::domain::foundation::{InvoiceId, Timestamp, YearMonthDay};

use super::{AddOnSource, Invoice, Membership, Order, OrderKind, SubscriptionError};

/// Invoices produced by one confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationInvoices {
    pub purchase: Invoice,
    pub carry_over: Option<Invoice>,
    /// Earlier invoices to stamp `carried_over_at`.
    pub carried_over: Vec<InvoiceId>,
}

impl ConfirmationInvoices {
    /// Invoices in the order they must be applied to the membership.
    pub fn in_application_order(&self) -> impl Iterator<Item = &Invoice> {
        std::iter::once(&self.purchase).chain(self.carry_over.iter())
    }
}

pub struct InvoiceFactory;

impl InvoiceFactory {
    /// Invoice for a confirmed order's own purchase.
    ///
    /// # Errors
    ///
    /// `InvoiceBuild` if the order is unconfirmed or its window does not
    /// match its kind (add-ons have none, everything else must have one).
    pub fn purchase_invoice(order: &Order) -> Result<Invoice, SubscriptionError> {
        let confirmed_at = order.confirmed_at.ok_or_else(|| {
            SubscriptionError::invoice_build(format!("order {} is not confirmed", order.id))
        })?;

        match (order.kind, order.window) {
            (OrderKind::Deny, _) => {
                return Err(SubscriptionError::invoice_build(format!(
                    "order {} was confirmed as deny",
                    order.id
                )));
            }
            (OrderKind::AddOn, Some(_)) => {
                return Err(SubscriptionError::invoice_build(format!(
                    "add-on order {} must not carry a window",
                    order.id
                )));
            }
            (OrderKind::Create | OrderKind::Renew | OrderKind::Upgrade, None) => {
                return Err(SubscriptionError::invoice_build(format!(
                    "{} order {} has no window",
                    order.kind, order.id
                )));
            }
            _ => {}
        }

        Ok(Invoice {
            id: InvoiceId::new(),
            user_id: order.user_id.clone(),
            order_id: Some(order.id),
            edition: order.edition,
            period: order.period,
            order_kind: order.kind,
            add_on_source: (order.kind == OrderKind::AddOn).then_some(AddOnSource::UserPurchase),
            payment_method: Some(order.payment_method),
            provider_subscription_id: order.provider_subscription_id.clone(),
            paid_amount: order.charged_amount,
            currency: order.currency.clone(),
            window: order.window,
            consumed_at: None,
            carried_over_at: None,
            created_at: confirmed_at,
        })
    }

    /// Freezes the membership's unused time when `order` is an upgrade.
    ///
    /// Returns `None` for other kinds or when no paid time is left.
    pub fn carry_over_invoice(
        membership: &Membership,
        order: &Order,
        at: Timestamp,
    ) -> Option<Invoice> {
        if order.kind != OrderKind::Upgrade {
            return None;
        }
        let remaining = membership.remaining_days(at);
        if remaining <= 0 {
            return None;
        }
        let days = u32::try_from(remaining).ok()?;

        Some(Invoice {
            id: InvoiceId::new(),
            user_id: membership.user_id.clone(),
            order_id: Some(order.id),
            edition: membership.edition,
            period: YearMonthDay::days(days),
            order_kind: OrderKind::AddOn,
            add_on_source: Some(AddOnSource::CarryOver),
            payment_method: membership.payment_method,
            provider_subscription_id: None,
            paid_amount: 0,
            currency: order.currency.clone(),
            window: None,
            consumed_at: None,
            carried_over_at: None,
            created_at: at,
        })
    }

    /// Invoices whose granted time is folded into a carry-over at `at`.
    ///
    /// Picks every invoice not yet carried over whose window ends after `at`.
    pub fn carry_over_targets(invoices: &[Invoice], at: Timestamp) -> Vec<InvoiceId> {
        invoices
            .iter()
            .filter(|inv| inv.carried_over_at.is_none())
            .filter(|inv| inv.window.map_or(false, |w| w.ends_after(at)))
            .map(|inv| inv.id)
            .collect()
    }

    /// All invoices for a confirmed order.
    ///
    /// `membership` is the state read under lock before this order applies;
    /// `existing` are the buyer's earlier invoices.
    pub fn for_confirmation(
        order: &Order,
        membership: Option<&Membership>,
        existing: &[Invoice],
        at: Timestamp,
    ) -> Result<ConfirmationInvoices, SubscriptionError> {
        let purchase = Self::purchase_invoice(order)?;
        let carry_over = membership.and_then(|m| Self::carry_over_invoice(m, order, at));
        let carried_over = if carry_over.is_some() {
            Self::carry_over_targets(existing, at)
        } else {
            Vec::new()
        };

        Ok(ConfirmationInvoices {
            purchase,
            carry_over,
            carried_over,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{DateWindow, UserId};
    use crate::domain::membership::aggregate::fixtures::membership;
    use crate::domain::membership::catalog::fixtures::price;
    use crate::domain::membership::invoice::fixtures::{add_on, granted};
    use crate::domain::membership::{Edition, PaymentMethod, Tier};

    fn ts(s: &str) -> Timestamp {
        Timestamp::parse(s).unwrap()
    }

    fn confirmed(edition: Edition, kind: OrderKind, at: &str) -> Order {
        let p = price(edition, YearMonthDay::years(1), 59800);
        let mut order = Order::place(
            UserId::new("reader-1").unwrap(),
            &p,
            None,
            kind,
            PaymentMethod::Wechat,
            ts("2024-05-31T00:00:00Z"),
        );
        let at = ts(at);
        let window = match kind {
            OrderKind::AddOn => None,
            _ => DateWindow::starting_at(at, &order.period),
        };
        order.confirm(kind, at, window).unwrap();
        order
    }

    #[test]
    fn purchase_invoice_copies_order_terms() {
        let order = confirmed(Edition::premium_year(), OrderKind::Upgrade, "2024-06-01T00:00:00Z");
        let invoice = InvoiceFactory::purchase_invoice(&order).unwrap();

        assert_eq!(invoice.order_id, Some(order.id));
        assert_eq!(invoice.edition, order.edition);
        assert_eq!(invoice.window, order.window);
        assert_eq!(invoice.paid_amount, 59800);
        assert_eq!(invoice.payment_method, Some(PaymentMethod::Wechat));
        assert_eq!(invoice.created_at, ts("2024-06-01T00:00:00Z"));
        assert!(invoice.add_on_source.is_none());
    }

    #[test]
    fn add_on_purchase_invoice_has_no_window() {
        let order = confirmed(Edition::standard_year(), OrderKind::AddOn, "2024-06-01T00:00:00Z");
        let invoice = InvoiceFactory::purchase_invoice(&order).unwrap();

        assert!(invoice.window.is_none());
        assert_eq!(invoice.add_on_source, Some(AddOnSource::UserPurchase));
        assert!(invoice.is_pending_add_on());
    }

    #[test]
    fn unconfirmed_order_cannot_be_invoiced() {
        let mut order = confirmed(Edition::standard_year(), OrderKind::Create, "2024-06-01T00:00:00Z");
        order.confirmed_at = None;

        let result = InvoiceFactory::purchase_invoice(&order);
        assert!(matches!(result, Err(SubscriptionError::InvoiceBuild(_))));
    }

    #[test]
    fn windowless_renewal_is_a_build_error() {
        let mut order = confirmed(Edition::standard_year(), OrderKind::Renew, "2024-06-01T00:00:00Z");
        order.window = None;

        assert!(InvoiceFactory::purchase_invoice(&order).is_err());
    }

    #[test]
    fn upgrade_carries_over_remaining_days_of_old_tier() {
        let m = membership(Edition::standard_year(), "2024-07-01T00:00:00Z", PaymentMethod::Alipay);
        let order = confirmed(Edition::premium_year(), OrderKind::Upgrade, "2024-06-01T00:00:00Z");

        let carry = InvoiceFactory::carry_over_invoice(&m, &order, ts("2024-06-01T00:00:00Z"))
            .unwrap();

        assert_eq!(carry.edition, Edition::standard_year());
        assert_eq!(carry.period, YearMonthDay::days(30));
        assert_eq!(carry.day_count(), m.remaining_days(ts("2024-06-01T00:00:00Z")));
        assert_eq!(carry.order_kind, OrderKind::AddOn);
        assert_eq!(carry.add_on_source, Some(AddOnSource::CarryOver));
        assert_eq!(carry.order_id, Some(order.id));
        assert_eq!(carry.paid_amount, 0);
        assert!(carry.window.is_none());
    }

    #[test]
    fn no_carry_over_for_renewals() {
        let m = membership(Edition::standard_year(), "2024-07-01T00:00:00Z", PaymentMethod::Alipay);
        let order = confirmed(Edition::standard_year(), OrderKind::Renew, "2024-06-01T00:00:00Z");

        assert!(InvoiceFactory::carry_over_invoice(&m, &order, ts("2024-06-01T00:00:00Z")).is_none());
    }

    #[test]
    fn no_carry_over_without_remaining_time() {
        let m = membership(Edition::standard_year(), "2024-05-01T00:00:00Z", PaymentMethod::Alipay);
        let order = confirmed(Edition::premium_year(), OrderKind::Upgrade, "2024-06-01T00:00:00Z");

        assert!(InvoiceFactory::carry_over_invoice(&m, &order, ts("2024-06-01T00:00:00Z")).is_none());
    }

    #[test]
    fn carry_over_targets_skip_ended_and_already_stamped() {
        let at = ts("2024-06-01T00:00:00Z");
        let current = granted(
            Edition::standard_year(),
            OrderKind::Create,
            "2024-01-01T00:00:00Z",
            YearMonthDay::years(1),
        );
        let queued = granted(
            Edition::standard_year(),
            OrderKind::Renew,
            "2025-01-01T00:00:00Z",
            YearMonthDay::years(1),
        );
        let ended = granted(
            Edition::standard_year(),
            OrderKind::Create,
            "2023-01-01T00:00:00Z",
            YearMonthDay::years(1),
        );
        let mut stamped = granted(
            Edition::standard_year(),
            OrderKind::Renew,
            "2024-03-01T00:00:00Z",
            YearMonthDay::years(1),
        );
        stamped.carried_over_at = Some(ts("2024-04-01T00:00:00Z"));
        let pending = add_on(Tier::Premium, YearMonthDay::days(10), "2024-02-01T00:00:00Z");

        let targets = InvoiceFactory::carry_over_targets(
            &[current.clone(), queued.clone(), ended, stamped, pending],
            at,
        );

        assert_eq!(targets, vec![current.id, queued.id]);
    }

    #[test]
    fn confirmation_bundle_for_upgrade_has_two_invoices_and_stamps() {
        let at = ts("2024-06-01T00:00:00Z");
        let m = membership(Edition::standard_year(), "2025-01-01T00:00:00Z", PaymentMethod::Alipay);
        let prior = granted(
            Edition::standard_year(),
            OrderKind::Create,
            "2024-01-01T00:00:00Z",
            YearMonthDay::years(1),
        );
        let order = confirmed(Edition::premium_year(), OrderKind::Upgrade, "2024-06-01T00:00:00Z");

        let bundle =
            InvoiceFactory::for_confirmation(&order, Some(&m), std::slice::from_ref(&prior), at)
                .unwrap();

        assert_eq!(bundle.purchase.order_kind, OrderKind::Upgrade);
        assert!(bundle.carry_over.is_some());
        assert_eq!(bundle.carried_over, vec![prior.id]);
        let kinds: Vec<_> = bundle.in_application_order().map(|i| i.order_kind).collect();
        assert_eq!(kinds, vec![OrderKind::Upgrade, OrderKind::AddOn]);
    }

    #[test]
    fn confirmation_bundle_for_create_stamps_nothing() {
        let at = ts("2024-06-01T00:00:00Z");
        let order = confirmed(Edition::standard_year(), OrderKind::Create, "2024-06-01T00:00:00Z");

        let bundle = InvoiceFactory::for_confirmation(&order, None, &[], at).unwrap();

        assert!(bundle.carry_over.is_none());
        assert!(bundle.carried_over.is_empty());
    }
}
