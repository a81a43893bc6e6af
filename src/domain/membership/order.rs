//! Purchase orders and the payment results that confirm them.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{
    DateWindow, OfferId, OrderId, PriceId, Timestamp, UserId, YearMonthDay,
};

use super::{Edition, Membership, Offer, OrderKind, PaymentMethod, Price, SubscriptionError};

/// One purchase intent.
///
/// # Invariants
///
/// - `confirmed_at` and `window` are written together, exactly once
/// - a confirmed order is never re-confirmed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub edition: Edition,
    /// Kind decided at checkout, replaced by calibration at confirmation.
    pub kind: OrderKind,
    pub price_id: PriceId,
    pub offer_id: Option<OfferId>,
    /// Catalog amount before discount, in cents.
    pub list_amount: i64,
    /// Amount the buyer must pay, in cents.
    pub charged_amount: i64,
    pub currency: String,
    /// Calendar period this purchase buys.
    pub period: YearMonthDay,
    pub payment_method: PaymentMethod,
    /// Stripe subscription, Apple original transaction or B2B licence this
    /// order pays through. Absent for one-time channels.
    pub provider_subscription_id: Option<String>,
    pub created_at: Timestamp,
    pub confirmed_at: Option<Timestamp>,
    /// Granted window; stays `None` for add-ons even after confirmation.
    pub window: Option<DateWindow>,
}

impl Order {
    /// Creates an unconfirmed order at checkout.
    pub fn place(
        user_id: UserId,
        price: &Price,
        offer: Option<&Offer>,
        kind: OrderKind,
        payment_method: PaymentMethod,
        at: Timestamp,
    ) -> Self {
        Self {
            id: OrderId::new(),
            user_id,
            edition: price.edition,
            kind,
            price_id: price.id.clone(),
            offer_id: offer.map(|o| o.id.clone()),
            list_amount: price.unit_amount,
            charged_amount: price.charge_for(offer),
            currency: price.currency.clone(),
            period: price.period,
            payment_method,
            provider_subscription_id: None,
            created_at: at,
            confirmed_at: None,
            window: None,
        }
    }

    /// Attaches the provider-side subscription a recurring or B2B order
    /// belongs to. Ignored for one-time channels.
    pub fn with_provider_subscription(mut self, id: Option<String>) -> Self {
        self.provider_subscription_id = id.filter(|_| !self.payment_method.is_one_time());
        self
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed_at.is_some()
    }

    /// Marks the order confirmed with its final kind and window.
    ///
    /// # Errors
    ///
    /// `AlreadyConfirmed` if a confirmation was already recorded.
    pub fn confirm(
        &mut self,
        kind: OrderKind,
        at: Timestamp,
        window: Option<DateWindow>,
    ) -> Result<(), SubscriptionError> {
        if self.is_confirmed() {
            return Err(SubscriptionError::AlreadyConfirmed(self.id));
        }
        self.kind = kind;
        self.confirmed_at = Some(at);
        self.window = window;
        Ok(())
    }
}

/// Verified outcome of a payment, produced by the gateway client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentResult {
    pub order_id: OrderId,
    pub confirmed_at: Timestamp,
    /// Amount actually paid, in cents.
    pub amount_paid: i64,
}

/// What checkout hands back to the client before payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub price: Price,
    pub offer: Option<Offer>,
    pub order: Order,
    /// Membership the order was classified against.
    pub membership: Option<Membership>,
}
