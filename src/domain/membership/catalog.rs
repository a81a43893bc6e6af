//! Price and discount values consumed from the pricing catalog.
//!
//! The catalog itself is external. These types carry only what checkout and
//! confirmation need: the edition bought, the period granted, and the amount.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{OfferId, PriceId, Timestamp, YearMonthDay};

use super::{Edition, OrderKind, SubscriptionError};

/// A catalog price. Amounts are integer minor units (cents).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    pub id: PriceId,
    pub edition: Edition,
    /// Calendar period granted per purchase; may exceed the nominal cycle.
    pub period: YearMonthDay,
    pub unit_amount: i64,
    pub currency: String,
    pub active: bool,
}

impl Price {
    /// Amount charged after applying `offer`. Never negative.
    pub fn charge_for(&self, offer: Option<&Offer>) -> i64 {
        let off = offer.map_or(0, |o| o.price_off);
        (self.unit_amount - off).max(0)
    }
}

/// Audience a discount is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferKind {
    /// Open to every buyer.
    Promotion,
    /// First purchase only.
    Introductory,
    /// Existing members renewing.
    Retention,
    /// Lapsed members coming back.
    WinBack,
}

/// A discount attached to one price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub price_id: PriceId,
    pub kind: OfferKind,
    pub price_off: i64,
    pub start_at: Option<Timestamp>,
    pub end_at: Option<Timestamp>,
}

impl Offer {
    /// Whether the offer's validity window covers `at`.
    pub fn is_in_effect(&self, at: Timestamp) -> bool {
        let started = self.start_at.map_or(true, |s| s <= at);
        let not_ended = self.end_at.map_or(true, |e| at < e);
        started && not_ended
    }

    /// Checks that this offer may discount `price` for a purchase of `kind`.
    ///
    /// `lapsed_member` is true when the buyer had a membership that has expired.
    pub fn check_applicable(
        &self,
        price: &Price,
        kind: OrderKind,
        lapsed_member: bool,
        at: Timestamp,
    ) -> Result<(), SubscriptionError> {
        if self.price_id != price.id {
            return Err(SubscriptionError::validation(
                "offer_id",
                format!("offer {} does not belong to price {}", self.id, price.id),
            ));
        }
        if self.price_off < 0 || self.price_off > price.unit_amount {
            return Err(SubscriptionError::validation(
                "offer_id",
                format!("offer {} discount is out of range", self.id),
            ));
        }
        if !self.is_in_effect(at) {
            return Err(SubscriptionError::validation(
                "offer_id",
                format!("offer {} is not in effect", self.id),
            ));
        }
        let eligible = match self.kind {
            OfferKind::Promotion => true,
            OfferKind::Introductory => kind == OrderKind::Create && !lapsed_member,
            OfferKind::Retention => kind == OrderKind::Renew,
            OfferKind::WinBack => kind == OrderKind::Create && lapsed_member,
        };
        if !eligible {
            return Err(SubscriptionError::validation(
                "offer_id",
                format!("offer {} is not applicable to a {} purchase", self.id, kind),
            ));
        }
        Ok(())
    }
}
