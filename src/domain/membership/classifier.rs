//! Order classification and confirmation-time calibration.
//!
//! `classify` is a pure function of a membership snapshot and the edition
//! being bought. Checkout calls it with the membership read without locks;
//! confirmation calls it again (calibration) with the membership read under
//! the row lock, since another channel or a concurrent order may have
//! changed it in between.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::foundation::{Timestamp, YearMonthDay};

use super::{Classification, DenyReason, Edition, Membership, Order, OrderKind, PaymentMethod};

/// Membership state that cannot be mapped to any order kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("membership cannot be classified: {reason}")]
pub struct Unclassifiable {
    pub reason: String,
}

/// Tunables for classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassificationPolicy {
    /// A renewal is denied once expiration already lies this far ahead.
    pub max_renewal: YearMonthDay,
}

impl Default for ClassificationPolicy {
    fn default() -> Self {
        Self {
            max_renewal: YearMonthDay::years(3),
        }
    }
}

/// Why a calibrated order needs a human to look at it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReviewReason {
    /// Membership state could not be classified; stored kind kept.
    Unclassifiable { reason: String },
    /// Classification denied a purchase that was already paid for.
    DeniedAfterPayment { reason: DenyReason },
    /// An upgrade confirmed after the buyer moved to a provider-billed plan.
    /// `denied` keeps the deny reason when the switch also made the
    /// purchase deniable.
    ProviderSwitched {
        to: Option<PaymentMethod>,
        denied: Option<DenyReason>,
    },
}

/// Result of re-classifying an order at confirmation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Calibration {
    /// Kind to confirm the order with. Never `Deny`.
    pub kind: OrderKind,
    /// Whether `kind` differs from the kind stored at checkout.
    pub changed: bool,
    pub review: Option<ReviewReason>,
}

/// Decides the kind of a purchase against a membership.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderClassifier {
    policy: ClassificationPolicy,
}

impl OrderClassifier {
    pub fn new(policy: ClassificationPolicy) -> Self {
        Self { policy }
    }

    /// Classifies buying `edition` against `membership` at `at`.
    ///
    /// Rules, first match wins:
    /// 1. no membership, or expired → Create
    /// 2. active locked subscription → Deny for the same tier, AddOn otherwise
    /// 3. active direct-pay → Renew (same tier), Upgrade (higher), AddOn (lower)
    ///
    /// # Errors
    ///
    /// `Unclassifiable` if an active membership carries no payment method.
    pub fn classify(
        &self,
        membership: Option<&Membership>,
        edition: &Edition,
        at: Timestamp,
    ) -> Result<Classification, Unclassifiable> {
        let m = match membership {
            Some(m) if !m.is_expired(at) => m,
            _ => return Ok(Classification::grant(OrderKind::Create)),
        };

        if m.payment_method.is_none() {
            return Err(Unclassifiable {
                reason: format!("active membership {} has no payment method", m.id),
            });
        }

        if m.is_locked_subscription() {
            if edition.tier == m.tier() {
                return Ok(Classification::deny(DenyReason::SubscriptionActive));
            }
            return Ok(Classification::grant(OrderKind::AddOn));
        }

        let current = m.tier();
        if edition.tier == current {
            if self.beyond_renewal_limit(m, at) {
                return Ok(Classification::deny(DenyReason::RenewalLimitExceeded));
            }
            Ok(Classification::grant(OrderKind::Renew))
        } else if edition.tier.rank() > current.rank() {
            Ok(Classification::grant(OrderKind::Upgrade))
        } else {
            Ok(Classification::grant(OrderKind::AddOn))
        }
    }

    /// Re-classifies `order` against the membership read under lock.
    ///
    /// A paid order is never dropped: a denial at this point turns the
    /// purchase into reserved add-on time, flagged for review. State that
    /// cannot be classified keeps the stored kind and is flagged too.
    pub fn calibrate(
        &self,
        order: &Order,
        membership: Option<&Membership>,
        at: Timestamp,
    ) -> Calibration {
        let classification = match self.classify(membership, &order.edition, at) {
            Ok(c) => c,
            Err(err) => {
                return Calibration {
                    kind: order.kind,
                    changed: false,
                    review: Some(ReviewReason::Unclassifiable { reason: err.reason }),
                };
            }
        };

        let denied = classification.deny_reason;
        let (kind, mut review) = match denied {
            Some(reason) => (
                OrderKind::AddOn,
                Some(ReviewReason::DeniedAfterPayment { reason }),
            ),
            None => (classification.kind, None),
        };

        if order.kind == OrderKind::Upgrade {
            if let Some(m) = membership.filter(|m| !m.is_expired(at) && m.is_locked_subscription())
            {
                review = Some(ReviewReason::ProviderSwitched {
                    to: m.payment_method,
                    denied,
                });
            }
        }

        Calibration {
            kind,
            changed: kind != order.kind,
            review,
        }
    }

    fn beyond_renewal_limit(&self, m: &Membership, at: Timestamp) -> bool {
        match self.policy.max_renewal.add_to(at) {
            Some(horizon) => m.expires_at > horizon,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::UserId;
    use crate::domain::membership::aggregate::fixtures::membership;
    use crate::domain::membership::catalog::fixtures::price;
    use crate::domain::membership::{Cycle, Tier};
    use proptest::prelude::*;

    fn ts(s: &str) -> Timestamp {
        Timestamp::parse(s).unwrap()
    }

    fn now() -> Timestamp {
        ts("2024-06-01T00:00:00Z")
    }

    fn classify(m: Option<&Membership>, edition: Edition) -> Classification {
        OrderClassifier::default().classify(m, &edition, now()).unwrap()
    }

    fn order_for(edition: Edition, kind: OrderKind) -> Order {
        let p = price(edition, edition.cycle.period(), 29800);
        Order::place(
            UserId::new("reader-1").unwrap(),
            &p,
            None,
            kind,
            PaymentMethod::Alipay,
            ts("2024-05-31T00:00:00Z"),
        )
    }

    // Rule 1

    #[test]
    fn no_membership_is_create() {
        assert_eq!(classify(None, Edition::standard_year()).kind, OrderKind::Create);
    }

    #[test]
    fn expired_membership_is_create_even_on_locked_channel() {
        let m = membership(Edition::premium_year(), "2024-05-01T00:00:00Z", PaymentMethod::Stripe);
        assert_eq!(classify(Some(&m), Edition::premium_year()).kind, OrderKind::Create);
    }

    // Rule 2

    #[test]
    fn same_tier_on_auto_renewing_stripe_is_denied() {
        let m = membership(Edition::standard_year(), "2025-01-01T00:00:00Z", PaymentMethod::Stripe);
        let c = classify(Some(&m), Edition::standard_year());

        assert_eq!(c.kind, OrderKind::Deny);
        assert_eq!(c.deny_reason, Some(DenyReason::SubscriptionActive));
    }

    #[test]
    fn other_tier_on_apple_is_add_on() {
        let m = membership(Edition::standard_year(), "2025-01-01T00:00:00Z", PaymentMethod::Apple);
        assert_eq!(classify(Some(&m), Edition::premium_year()).kind, OrderKind::AddOn);
    }

    #[test]
    fn other_tier_on_b2b_is_add_on() {
        let m = membership(Edition::premium_year(), "2025-01-01T00:00:00Z", PaymentMethod::B2b);
        assert_eq!(classify(Some(&m), Edition::standard_year()).kind, OrderKind::AddOn);
    }

    #[test]
    fn stripe_with_auto_renewal_off_behaves_like_direct_pay() {
        let mut m =
            membership(Edition::standard_year(), "2025-01-01T00:00:00Z", PaymentMethod::Stripe);
        m.auto_renewal = false;
        assert_eq!(classify(Some(&m), Edition::standard_year()).kind, OrderKind::Renew);
    }

    // Rule 3

    #[test]
    fn same_tier_direct_pay_is_renew() {
        let m = membership(Edition::standard_year(), "2025-01-01T00:00:00Z", PaymentMethod::Alipay);
        assert_eq!(classify(Some(&m), Edition::standard_month()).kind, OrderKind::Renew);
    }

    #[test]
    fn higher_tier_direct_pay_is_upgrade() {
        let m = membership(Edition::standard_year(), "2025-01-01T00:00:00Z", PaymentMethod::Wechat);
        assert_eq!(classify(Some(&m), Edition::premium_year()).kind, OrderKind::Upgrade);
    }

    #[test]
    fn lower_tier_direct_pay_is_add_on() {
        let m = membership(Edition::premium_year(), "2025-01-01T00:00:00Z", PaymentMethod::Alipay);
        assert_eq!(classify(Some(&m), Edition::standard_year()).kind, OrderKind::AddOn);
    }

    #[test]
    fn renewal_beyond_horizon_is_denied() {
        let m = membership(Edition::standard_year(), "2027-06-02T00:00:00Z", PaymentMethod::Alipay);
        let c = classify(Some(&m), Edition::standard_year());
        assert_eq!(c.deny_reason, Some(DenyReason::RenewalLimitExceeded));
    }

    #[test]
    fn renewal_at_horizon_is_allowed() {
        let m = membership(Edition::standard_year(), "2027-06-01T00:00:00Z", PaymentMethod::Alipay);
        assert_eq!(classify(Some(&m), Edition::standard_year()).kind, OrderKind::Renew);
    }

    #[test]
    fn active_membership_without_payment_method_is_unclassifiable() {
        let mut m =
            membership(Edition::standard_year(), "2025-01-01T00:00:00Z", PaymentMethod::Alipay);
        m.payment_method = None;

        let result = OrderClassifier::default().classify(Some(&m), &Edition::standard_year(), now());
        assert!(result.is_err());
    }

    // Calibration

    #[test]
    fn calibration_keeps_matching_kind() {
        let m = membership(Edition::standard_year(), "2025-01-01T00:00:00Z", PaymentMethod::Alipay);
        let order = order_for(Edition::standard_year(), OrderKind::Renew);

        let c = OrderClassifier::default().calibrate(&order, Some(&m), now());
        assert_eq!(c.kind, OrderKind::Renew);
        assert!(!c.changed);
        assert!(c.review.is_none());
    }

    #[test]
    fn calibration_turns_create_into_renew_after_racing_order() {
        let m = membership(Edition::standard_year(), "2025-01-01T00:00:00Z", PaymentMethod::Alipay);
        let order = order_for(Edition::standard_year(), OrderKind::Create);

        let c = OrderClassifier::default().calibrate(&order, Some(&m), now());
        assert_eq!(c.kind, OrderKind::Renew);
        assert!(c.changed);
    }

    #[test]
    fn calibration_reserves_time_when_now_denied() {
        let m = membership(Edition::standard_year(), "2025-01-01T00:00:00Z", PaymentMethod::Stripe);
        let order = order_for(Edition::standard_year(), OrderKind::Renew);

        let c = OrderClassifier::default().calibrate(&order, Some(&m), now());
        assert_eq!(c.kind, OrderKind::AddOn);
        assert_eq!(
            c.review,
            Some(ReviewReason::DeniedAfterPayment {
                reason: DenyReason::SubscriptionActive
            })
        );
    }

    #[test]
    fn calibration_flags_upgrade_after_provider_switch() {
        let m = membership(Edition::standard_year(), "2025-01-01T00:00:00Z", PaymentMethod::Apple);
        let order = order_for(Edition::premium_year(), OrderKind::Upgrade);

        let c = OrderClassifier::default().calibrate(&order, Some(&m), now());
        assert_eq!(c.kind, OrderKind::AddOn);
        assert_eq!(
            c.review,
            Some(ReviewReason::ProviderSwitched {
                to: Some(PaymentMethod::Apple),
                denied: None,
            })
        );
    }

    #[test]
    fn provider_switch_keeps_the_deny_reason() {
        let m = membership(Edition::premium_year(), "2025-01-01T00:00:00Z", PaymentMethod::Stripe);
        let order = order_for(Edition::premium_year(), OrderKind::Upgrade);

        let c = OrderClassifier::default().calibrate(&order, Some(&m), now());
        assert_eq!(c.kind, OrderKind::AddOn);
        assert_eq!(
            c.review,
            Some(ReviewReason::ProviderSwitched {
                to: Some(PaymentMethod::Stripe),
                denied: Some(DenyReason::SubscriptionActive),
            })
        );
    }

    #[test]
    fn calibration_keeps_stored_kind_when_unclassifiable() {
        let mut m =
            membership(Edition::standard_year(), "2025-01-01T00:00:00Z", PaymentMethod::Alipay);
        m.payment_method = None;
        let order = order_for(Edition::premium_year(), OrderKind::Upgrade);

        let c = OrderClassifier::default().calibrate(&order, Some(&m), now());
        assert_eq!(c.kind, OrderKind::Upgrade);
        assert!(!c.changed);
        assert!(matches!(c.review, Some(ReviewReason::Unclassifiable { .. })));
    }

    fn any_method() -> impl Strategy<Value = Option<PaymentMethod>> {
        prop_oneof![
            Just(None),
            Just(Some(PaymentMethod::Alipay)),
            Just(Some(PaymentMethod::Wechat)),
            Just(Some(PaymentMethod::Stripe)),
            Just(Some(PaymentMethod::Apple)),
            Just(Some(PaymentMethod::B2b)),
        ]
    }

    fn any_tier() -> impl Strategy<Value = Tier> {
        prop_oneof![Just(Tier::Standard), Just(Tier::Premium)]
    }

    fn any_cycle() -> impl Strategy<Value = Cycle> {
        prop_oneof![Just(Cycle::Month), Just(Cycle::Year)]
    }

    proptest! {
        #[test]
        fn classification_is_total_and_consistent(
            has_membership in any::<bool>(),
            current_tier in any_tier(),
            wanted_tier in any_tier(),
            cycle in any_cycle(),
            method in any_method(),
            auto_renewal in any::<bool>(),
            offset_days in -400i64..2000,
        ) {
            let at = now();
            let m = has_membership.then(|| {
                let mut m = membership(
                    Edition::new(current_tier, Cycle::Year),
                    "2024-01-01T00:00:00Z",
                    PaymentMethod::Alipay,
                );
                m.expires_at = at.add_days(offset_days);
                m.payment_method = method;
                m.auto_renewal = auto_renewal;
                m
            });
            let edition = Edition::new(wanted_tier, cycle);

            match OrderClassifier::default().classify(m.as_ref(), &edition, at) {
                Ok(c) => {
                    prop_assert_eq!(c.deny_reason.is_some(), c.kind == OrderKind::Deny);
                    let kinds = [
                        OrderKind::Create,
                        OrderKind::Renew,
                        OrderKind::Upgrade,
                        OrderKind::AddOn,
                        OrderKind::Deny,
                    ];
                    prop_assert!(kinds.contains(&c.kind));
                }
                Err(_) => {
                    let m = m.as_ref().unwrap();
                    prop_assert!(m.payment_method.is_none());
                    prop_assert!(!m.is_expired(at));
                }
            }
        }
    }
}
