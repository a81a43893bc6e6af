//! Payment channels a membership or order can be paid through.

use serde::{Deserialize, Serialize};

/// Payment channel.
///
/// One-time channels grant a fixed window per payment. Recurring channels are
/// billed by the provider on their own schedule and cannot be cancelled from
/// this side while auto-renewal is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Alipay,
    Wechat,
    Stripe,
    Apple,
    B2b,
}

impl PaymentMethod {
    /// Direct one-time payment that buys a fixed window.
    pub fn is_one_time(&self) -> bool {
        matches!(self, PaymentMethod::Alipay | PaymentMethod::Wechat)
    }

    /// Provider-billed recurring subscription or in-app purchase.
    pub fn is_recurring(&self) -> bool {
        matches!(self, PaymentMethod::Stripe | PaymentMethod::Apple)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Alipay => "alipay",
            PaymentMethod::Wechat => "wechat",
            PaymentMethod::Stripe => "stripe",
            PaymentMethod::Apple => "apple",
            PaymentMethod::B2b => "b2b",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "alipay" => Some(PaymentMethod::Alipay),
            "wechat" => Some(PaymentMethod::Wechat),
            "stripe" => Some(PaymentMethod::Stripe),
            "apple" => Some(PaymentMethod::Apple),
            "b2b" => Some(PaymentMethod::B2b),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
