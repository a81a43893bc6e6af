//! Membership tier, billing cycle and edition definitions.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::YearMonthDay;

/// Paywall tier determining which content a buyer can read.
///
/// Ordering follows rank: `Standard < Premium`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Standard,
    Premium,
}

impl Tier {
    /// Returns the display name for this tier.
    pub fn display_name(&self) -> &'static str {
        match self {
            Tier::Standard => "Standard",
            Tier::Premium => "Premium",
        }
    }

    /// Returns the numeric rank of this tier for comparison.
    ///
    /// Higher rank = more content. Used for upgrade detection.
    pub fn rank(&self) -> u8 {
        match self {
            Tier::Standard => 0,
            Tier::Premium => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Standard => "standard",
            Tier::Premium => "premium",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "standard" => Some(Tier::Standard),
            "premium" => Some(Tier::Premium),
            _ => None,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Billing cycle of an edition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cycle {
    Month,
    Year,
}

impl Cycle {
    /// Nominal calendar period of one cycle.
    pub fn period(&self) -> YearMonthDay {
        match self {
            Cycle::Month => YearMonthDay::months(1),
            Cycle::Year => YearMonthDay::years(1),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Cycle::Month => "month",
            Cycle::Year => "year",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "month" => Some(Cycle::Month),
            "year" => Some(Cycle::Year),
            _ => None,
        }
    }
}

/// A purchasable `{tier, cycle}` combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edition {
    pub tier: Tier,
    pub cycle: Cycle,
}

impl Edition {
    pub fn new(tier: Tier, cycle: Cycle) -> Self {
        Self { tier, cycle }
    }

    pub fn standard_year() -> Self {
        Self::new(Tier::Standard, Cycle::Year)
    }

    pub fn standard_month() -> Self {
        Self::new(Tier::Standard, Cycle::Month)
    }

    pub fn premium_year() -> Self {
        Self::new(Tier::Premium, Cycle::Year)
    }
}

impl std::fmt::Display for Edition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.tier.as_str(), self.cycle.as_str())
    }
}
