//! Membership aggregate entity.
//!
//! A Membership is a buyer's current paywall entitlement. Each buyer has at
//! most one. Buyers without a Membership have no access.
//!
//! # Design Decisions
//!
//! - **One per buyer**: Unique constraint on user_id enforced at database level
//! - **Reserved days per tier**: Add-on purchases bank days here until activated
//! - **Superseded, not deleted**: Every change archives the prior value as a snapshot
//! - **Money-free**: Amounts live on orders and invoices, never on the membership

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{MembershipId, OrderId, SnapshotId, Timestamp, UserId};

use super::{Edition, OrderKind, PaymentMethod, Tier};

/// Reserved add-on days, keyed by tier.
///
/// Balances only grow through windowless add-on invoices and only shrink
/// when a reserved group is activated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddOnBalance {
    pub standard: i64,
    pub premium: i64,
}

impl AddOnBalance {
    pub fn get(&self, tier: Tier) -> i64 {
        match tier {
            Tier::Standard => self.standard,
            Tier::Premium => self.premium,
        }
    }

    /// Adds `days` to the tier's balance.
    pub fn add(&mut self, tier: Tier, days: i64) {
        match tier {
            Tier::Standard => self.standard += days,
            Tier::Premium => self.premium += days,
        }
    }

    /// Removes up to `days` from the tier's balance, never going negative.
    pub fn take(&mut self, tier: Tier, days: i64) {
        let slot = match tier {
            Tier::Standard => &mut self.standard,
            Tier::Premium => &mut self.premium,
        };
        *slot = (*slot - days).max(0);
    }

    pub fn is_empty(&self) -> bool {
        self.standard <= 0 && self.premium <= 0
    }
}

/// Membership aggregate - a buyer's current entitlement.
///
/// # Invariants
///
/// - `user_id` is unique (one membership per buyer)
/// - at most one active `{tier, expires_at}` pair
/// - `add_on` balances are non-negative
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    /// Unique identifier for this membership.
    pub id: MembershipId,

    /// Buyer who owns this membership.
    pub user_id: UserId,

    /// Current `{tier, cycle}`.
    pub edition: Edition,

    /// Access ends at this instant.
    pub expires_at: Timestamp,

    /// Channel that paid for the current window. `None` only on legacy rows.
    pub payment_method: Option<PaymentMethod>,

    /// Whether a recurring provider will bill again on its own.
    pub auto_renewal: bool,

    /// Stripe subscription ID (recurring billing).
    pub stripe_subscription_id: Option<String>,

    /// Apple original transaction ID (in-app purchase).
    pub apple_subscription_id: Option<String>,

    /// Corporate licence ID.
    pub b2b_licence_id: Option<String>,

    /// Reserved add-on days per tier.
    pub add_on: AddOnBalance,

    pub created_at: Timestamp,

    pub updated_at: Timestamp,
}

impl Membership {
    /// True once access has lapsed at `at`.
    pub fn is_expired(&self, at: Timestamp) -> bool {
        self.expires_at <= at
    }

    /// Whole days of paid time left at `at`, rounded up.
    ///
    /// Any partial day left counts as a full day in the buyer's favor.
    /// Returns 0 once expired.
    pub fn remaining_days(&self, at: Timestamp) -> i64 {
        if self.is_expired(at) {
            return 0;
        }
        let secs = self.expires_at.duration_since(&at).num_seconds();
        (secs + 86_399) / 86_400
    }

    /// Active subscription that cannot be cancelled from our side.
    ///
    /// Recurring channels qualify only while auto-renewal is on; a B2B licence
    /// always qualifies.
    pub fn is_locked_subscription(&self) -> bool {
        match self.payment_method {
            Some(PaymentMethod::B2b) => true,
            Some(method) if method.is_recurring() => self.auto_renewal,
            _ => false,
        }
    }

    pub fn tier(&self) -> Tier {
        self.edition.tier
    }

    /// Records the time of the latest mutation.
    pub fn touch(&mut self, at: Timestamp) {
        self.updated_at = at;
    }
}

/// Why a membership value was archived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "kind", rename_all = "snake_case")]
pub enum SnapshotReason {
    /// Superseded by a confirmed order of this kind.
    Order(OrderKind),
    /// Superseded by activating reserved add-on days.
    AddOnClaim,
}

impl SnapshotReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotReason::Order(kind) => kind.as_str(),
            SnapshotReason::AddOnClaim => "add_on_claim",
        }
    }
}

/// Archived copy of a membership as it was before a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipSnapshot {
    pub id: SnapshotId,
    pub membership: Membership,
    pub reason: SnapshotReason,
    pub order_id: Option<OrderId>,
    pub created_at: Timestamp,
}

impl MembershipSnapshot {
    pub fn archive(
        membership: &Membership,
        reason: SnapshotReason,
        order_id: Option<OrderId>,
        at: Timestamp,
    ) -> Self {
        Self {
            id: SnapshotId::new(),
            membership: membership.clone(),
            reason,
            order_id,
            created_at: at,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::membership;
    use super::*;

    fn ts(s: &str) -> Timestamp {
        Timestamp::parse(s).unwrap()
    }

    #[test]
    fn expired_exactly_at_expiration() {
        let m = membership(Edition::standard_year(), "2024-03-01T00:00:00Z", PaymentMethod::Alipay);

        assert!(!m.is_expired(ts("2024-02-29T23:59:59Z")));
        assert!(m.is_expired(ts("2024-03-01T00:00:00Z")));
    }

    #[test]
    fn remaining_days_rounds_partial_days_up() {
        let m = membership(Edition::standard_year(), "2024-03-01T00:00:00Z", PaymentMethod::Alipay);

        assert_eq!(m.remaining_days(ts("2024-02-20T00:00:00Z")), 10);
        assert_eq!(m.remaining_days(ts("2024-02-20T06:00:00Z")), 10);
        assert_eq!(m.remaining_days(ts("2024-02-29T23:00:00Z")), 1);
        assert_eq!(m.remaining_days(ts("2024-03-05T00:00:00Z")), 0);
    }

    #[test]
    fn auto_renewing_stripe_is_locked() {
        let m = membership(Edition::standard_year(), "2025-01-01T00:00:00Z", PaymentMethod::Stripe);
        assert!(m.is_locked_subscription());
    }

    #[test]
    fn stripe_with_auto_renewal_off_is_not_locked() {
        let mut m =
            membership(Edition::standard_year(), "2025-01-01T00:00:00Z", PaymentMethod::Stripe);
        m.auto_renewal = false;
        assert!(!m.is_locked_subscription());
    }

    #[test]
    fn b2b_is_always_locked() {
        let mut m = membership(Edition::premium_year(), "2025-01-01T00:00:00Z", PaymentMethod::B2b);
        m.auto_renewal = false;
        assert!(m.is_locked_subscription());
    }

    #[test]
    fn one_time_is_never_locked() {
        let m = membership(Edition::standard_year(), "2025-01-01T00:00:00Z", PaymentMethod::Wechat);
        assert!(!m.is_locked_subscription());
    }

    #[test]
    fn add_on_balance_take_floors_at_zero() {
        let mut balance = AddOnBalance::default();
        balance.add(Tier::Standard, 30);
        balance.add(Tier::Premium, 5);
        balance.take(Tier::Premium, 9);

        assert_eq!(balance.get(Tier::Standard), 30);
        assert_eq!(balance.get(Tier::Premium), 0);
        assert!(!balance.is_empty());
    }

    #[test]
    fn snapshot_keeps_prior_value() {
        let m = membership(Edition::standard_year(), "2025-01-01T00:00:00Z", PaymentMethod::Alipay);
        let at = ts("2024-06-01T00:00:00Z");
        let snapshot =
            MembershipSnapshot::archive(&m, SnapshotReason::Order(OrderKind::Upgrade), None, at);

        assert_eq!(snapshot.membership, m);
        assert_eq!(snapshot.reason.as_str(), "upgrade");
        assert_eq!(snapshot.created_at, at);
    }
}
