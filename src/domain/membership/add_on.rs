//! Reserved add-on days: grouping pending invoices and activating them.

use std::collections::BTreeMap;

use crate::domain::foundation::{DateWindow, InvoiceId, Timestamp};

use super::{Invoice, Membership, MembershipProjector, SubscriptionError, Tier};

/// Pending add-on invoices of one tier, reduced to a day count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddOnGroup {
    pub tier: Tier,
    /// Sum of the invoices' days under the 366/31 approximation.
    pub total_days: i64,
    /// Members in creation order, oldest first.
    pub invoices: Vec<Invoice>,
}

impl AddOnGroup {
    pub fn invoice_ids(&self) -> Vec<InvoiceId> {
        self.invoices.iter().map(|inv| inv.id).collect()
    }

    /// Most recently created member.
    pub fn representative(&self) -> Option<&Invoice> {
        self.invoices.last()
    }
}

/// Outcome of turning a group of reserved days into real windows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddOnActivation {
    pub tier: Tier,
    pub total_days: i64,
    /// Activated invoices, each now carrying a window and `consumed_at`.
    pub invoices: Vec<Invoice>,
    pub membership: Membership,
}

pub struct AddOnAggregator;

impl AddOnAggregator {
    /// Groups pending add-on invoices by tier and sums their days.
    ///
    /// Consumed, carried-over and windowed invoices are skipped.
    pub fn group_and_reduce(invoices: &[Invoice]) -> BTreeMap<Tier, AddOnGroup> {
        let mut groups: BTreeMap<Tier, AddOnGroup> = BTreeMap::new();

        for invoice in invoices.iter().filter(|inv| inv.is_pending_add_on()) {
            let tier = invoice.edition.tier;
            let group = groups.entry(tier).or_insert_with(|| AddOnGroup {
                tier,
                total_days: 0,
                invoices: Vec::new(),
            });
            group.total_days += invoice.day_count();
            group.invoices.push(invoice.clone());
        }

        for group in groups.values_mut() {
            group.invoices.sort_by_key(|inv| inv.created_at);
        }
        groups
    }

    /// Group to claim next: the highest tier with pending days.
    pub fn next_claim(mut groups: BTreeMap<Tier, AddOnGroup>) -> Option<AddOnGroup> {
        groups.pop_last().map(|(_, group)| group)
    }

    /// Activates `group` on a lapsed membership.
    ///
    /// Windows are laid end to end in creation order starting at the later
    /// of `at` and the current expiration.
    ///
    /// # Errors
    ///
    /// - `Validation` if the membership is still active at `at`
    /// - `InvoiceBuild` if a window overflows the calendar or an invoice
    ///   already has one
    pub fn activate(
        membership: Membership,
        group: AddOnGroup,
        at: Timestamp,
    ) -> Result<AddOnActivation, SubscriptionError> {
        if !membership.is_expired(at) {
            return Err(SubscriptionError::validation(
                "membership",
                format!("membership {} is still active", membership.id),
            ));
        }

        let mut cursor = at.later_of(membership.expires_at);
        let mut projected = membership;
        let mut activated = Vec::with_capacity(group.invoices.len());

        for mut invoice in group.invoices {
            let window = DateWindow::starting_at(cursor, &invoice.period).ok_or_else(|| {
                SubscriptionError::invoice_build(format!(
                    "add-on {} overflows calendar from {}",
                    invoice.id, cursor
                ))
            })?;
            invoice.activate(window, at)?;
            cursor = window.end;
            projected = MembershipProjector::apply(projected, &invoice);
            activated.push(invoice);
        }

        projected.add_on.take(group.tier, group.total_days);
        projected.touch(at);

        Ok(AddOnActivation {
            tier: group.tier,
            total_days: group.total_days,
            invoices: activated,
            membership: projected,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::YearMonthDay;
    use crate::domain::membership::aggregate::fixtures::membership;
    use crate::domain::membership::invoice::fixtures::{add_on, granted};
    use crate::domain::membership::{Edition, OrderKind, PaymentMethod};
    use std::collections::BTreeSet;

    fn ts(s: &str) -> Timestamp {
        Timestamp::parse(s).unwrap()
    }

    #[test]
    fn three_standard_add_ons_reduce_to_404_days() {
        let a = add_on(Tier::Standard, YearMonthDay::new(1, 0, 1), "2024-01-01T00:00:00Z");
        let b = add_on(Tier::Standard, YearMonthDay::new(0, 1, 1), "2024-02-01T00:00:00Z");
        let c = add_on(Tier::Standard, YearMonthDay::days(5), "2024-03-01T00:00:00Z");

        let groups = AddOnAggregator::group_and_reduce(&[a.clone(), b.clone(), c.clone()]);

        assert_eq!(groups.len(), 1);
        let group = &groups[&Tier::Standard];
        assert_eq!(group.total_days, 404);
        let ids: BTreeSet<_> = group.invoice_ids().into_iter().collect();
        assert_eq!(ids, BTreeSet::from([a.id, b.id, c.id]));
    }

    #[test]
    fn ineligible_invoices_are_skipped() {
        let pending = add_on(Tier::Premium, YearMonthDay::days(10), "2024-01-01T00:00:00Z");
        let mut consumed = add_on(Tier::Premium, YearMonthDay::days(10), "2024-01-02T00:00:00Z");
        consumed.consumed_at = Some(ts("2024-02-01T00:00:00Z"));
        let mut carried = add_on(Tier::Premium, YearMonthDay::days(10), "2024-01-03T00:00:00Z");
        carried.carried_over_at = Some(ts("2024-02-01T00:00:00Z"));
        let windowed = granted(
            Edition::premium_year(),
            OrderKind::Create,
            "2024-01-01T00:00:00Z",
            YearMonthDay::years(1),
        );

        let groups = AddOnAggregator::group_and_reduce(&[pending.clone(), consumed, carried, windowed]);

        assert_eq!(groups[&Tier::Premium].invoice_ids(), vec![pending.id]);
        assert_eq!(groups[&Tier::Premium].total_days, 10);
    }

    #[test]
    fn representative_is_most_recent() {
        let late = add_on(Tier::Standard, YearMonthDay::days(1), "2024-05-01T00:00:00Z");
        let early = add_on(Tier::Standard, YearMonthDay::days(1), "2024-01-01T00:00:00Z");

        let groups = AddOnAggregator::group_and_reduce(&[late.clone(), early.clone()]);
        let group = &groups[&Tier::Standard];

        assert_eq!(group.representative().map(|i| i.id), Some(late.id));
        assert_eq!(group.invoice_ids(), vec![early.id, late.id]);
    }

    #[test]
    fn premium_is_claimed_first() {
        let standard = add_on(Tier::Standard, YearMonthDay::days(1), "2024-01-01T00:00:00Z");
        let premium = add_on(Tier::Premium, YearMonthDay::days(1), "2024-01-01T00:00:00Z");

        let groups = AddOnAggregator::group_and_reduce(&[standard, premium]);

        assert_eq!(AddOnAggregator::next_claim(groups).map(|g| g.tier), Some(Tier::Premium));
    }

    #[test]
    fn activation_lays_windows_end_to_end() {
        let mut m =
            membership(Edition::standard_year(), "2024-05-01T00:00:00Z", PaymentMethod::Alipay);
        m.add_on.standard = 37;
        let first = add_on(Tier::Standard, YearMonthDay::months(1), "2024-01-01T00:00:00Z");
        let second = add_on(Tier::Standard, YearMonthDay::days(6), "2024-02-01T00:00:00Z");
        let group = AddOnAggregator::group_and_reduce(&[second, first])
            .remove(&Tier::Standard)
            .unwrap();
        let at = ts("2024-06-01T00:00:00Z");

        let activation = AddOnAggregator::activate(m, group, at).unwrap();

        let windows: Vec<_> = activation.invoices.iter().map(|i| i.window.unwrap()).collect();
        assert_eq!(windows[0].start, at);
        assert_eq!(windows[0].end, ts("2024-07-01T00:00:00Z"));
        assert_eq!(windows[1].start, windows[0].end);
        assert_eq!(windows[1].end, ts("2024-07-07T00:00:00Z"));
        assert!(activation.invoices.iter().all(|i| i.consumed_at == Some(at)));
        assert_eq!(activation.membership.expires_at, ts("2024-07-07T00:00:00Z"));
        assert_eq!(activation.membership.add_on.standard, 0);
    }

    #[test]
    fn activation_on_active_membership_is_rejected() {
        let m = membership(Edition::standard_year(), "2025-01-01T00:00:00Z", PaymentMethod::Alipay);
        let group = AddOnAggregator::group_and_reduce(&[add_on(
            Tier::Standard,
            YearMonthDay::days(5),
            "2024-01-01T00:00:00Z",
        )])
        .remove(&Tier::Standard)
        .unwrap();

        let result = AddOnAggregator::activate(m, group, ts("2024-06-01T00:00:00Z"));

        assert!(matches!(result, Err(SubscriptionError::Validation { .. })));
    }
}
