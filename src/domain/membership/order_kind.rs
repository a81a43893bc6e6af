//! Classification of a purchase relative to the buyer's membership.

use serde::{Deserialize, Serialize};

/// What a purchase does to the buyer's membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    /// No current entitlement; starts a new one.
    Create,
    /// Same tier; extends the current expiration.
    Renew,
    /// Higher tier; takes effect immediately, old remainder carried over.
    Upgrade,
    /// Time reserved for later without touching the active entitlement.
    AddOn,
    /// Purchase not allowed against the current membership.
    Deny,
}

impl OrderKind {
    /// Kinds that produce an invoice when confirmed.
    pub fn is_grantable(&self) -> bool {
        !matches!(self, OrderKind::Deny)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderKind::Create => "create",
            OrderKind::Renew => "renew",
            OrderKind::Upgrade => "upgrade",
            OrderKind::AddOn => "add_on",
            OrderKind::Deny => "deny",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(OrderKind::Create),
            "renew" => Some(OrderKind::Renew),
            "upgrade" => Some(OrderKind::Upgrade),
            "add_on" => Some(OrderKind::AddOn),
            "deny" => Some(OrderKind::Deny),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a purchase was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// Buyer already has an auto-renewing subscription or licence for this tier.
    SubscriptionActive,
    /// Renewing would push expiration past the allowed horizon.
    RenewalLimitExceeded,
}

impl DenyReason {
    pub fn message(&self) -> &'static str {
        match self {
            DenyReason::SubscriptionActive => {
                "an auto-renewing subscription for this tier is already active"
            }
            DenyReason::RenewalLimitExceeded => "membership is already renewed to the maximum allowed",
        }
    }
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

/// Outcome of classifying a purchase.
///
/// `deny_reason` is set exactly when `kind` is `Deny`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub kind: OrderKind,
    pub deny_reason: Option<DenyReason>,
}

impl Classification {
    pub fn grant(kind: OrderKind) -> Self {
        debug_assert!(kind.is_grantable());
        Self {
            kind,
            deny_reason: None,
        }
    }

    pub fn deny(reason: DenyReason) -> Self {
        Self {
            kind: OrderKind::Deny,
            deny_reason: Some(reason),
        }
    }

    pub fn is_denied(&self) -> bool {
        self.kind == OrderKind::Deny
    }
}
