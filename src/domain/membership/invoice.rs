//! Invoices: units of granted or reserved access.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{
    DateWindow, InvoiceId, OrderId, Timestamp, UserId, YearMonthDay,
};

use super::{Edition, OrderKind, PaymentMethod, SubscriptionError};

/// Where an add-on invoice's reserved time came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddOnSource {
    /// Unused time frozen when the buyer upgraded.
    CarryOver,
    /// Granted by staff.
    Compensation,
    /// Bought directly as an add-on.
    UserPurchase,
}

impl AddOnSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AddOnSource::CarryOver => "carry_over",
            AddOnSource::Compensation => "compensation",
            AddOnSource::UserPurchase => "user_purchase",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "carry_over" => Some(AddOnSource::CarryOver),
            "compensation" => Some(AddOnSource::Compensation),
            "user_purchase" => Some(AddOnSource::UserPurchase),
            _ => None,
        }
    }
}

/// A unit of granted (windowed) or reserved (windowless) access.
///
/// # Invariants
///
/// - once `window` is set it never changes
/// - add-on invoices are created without a window; only add-on activation sets one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub user_id: UserId,
    pub order_id: Option<OrderId>,
    pub edition: Edition,
    pub period: YearMonthDay,
    pub order_kind: OrderKind,
    pub add_on_source: Option<AddOnSource>,
    pub payment_method: Option<PaymentMethod>,
    /// Provider-side subscription or licence copied from the order.
    pub provider_subscription_id: Option<String>,
    /// Amount paid for this invoice, in cents. Zero for carry-overs.
    pub paid_amount: i64,
    pub currency: String,
    pub window: Option<DateWindow>,
    /// When reserved days were activated into a window.
    pub consumed_at: Option<Timestamp>,
    /// When a later upgrade froze this invoice's remainder.
    pub carried_over_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl Invoice {
    /// Reserved days under the fixed 366/31 approximation.
    pub fn day_count(&self) -> i64 {
        self.period.to_days()
    }

    /// Add-on still waiting to be activated.
    pub fn is_pending_add_on(&self) -> bool {
        self.order_kind == OrderKind::AddOn
            && self.window.is_none()
            && self.consumed_at.is_none()
            && self.carried_over_at.is_none()
    }

    /// Assigns the window for a reserved add-on and marks it consumed.
    ///
    /// # Errors
    ///
    /// `InvoiceBuild` if the invoice already has a window.
    pub fn activate(&mut self, window: DateWindow, at: Timestamp) -> Result<(), SubscriptionError> {
        if self.window.is_some() {
            return Err(SubscriptionError::invoice_build(format!(
                "invoice {} already has a window",
                self.id
            )));
        }
        self.window = Some(window);
        self.consumed_at = Some(at);
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::{add_on, granted};
    use super::*;
    use crate::domain::membership::Tier;

    fn ts(s: &str) -> Timestamp {
        Timestamp::parse(s).unwrap()
    }

    #[test]
    fn fresh_add_on_is_pending() {
        let invoice = add_on(Tier::Standard, YearMonthDay::days(5), "2024-01-01T00:00:00Z");
        assert!(invoice.is_pending_add_on());
        assert_eq!(invoice.day_count(), 5);
    }

    #[test]
    fn carried_over_add_on_is_not_pending() {
        let mut invoice = add_on(Tier::Standard, YearMonthDay::days(5), "2024-01-01T00:00:00Z");
        invoice.carried_over_at = Some(ts("2024-02-01T00:00:00Z"));
        assert!(!invoice.is_pending_add_on());
    }

    #[test]
    fn activation_sets_window_and_consumption_once() {
        let mut invoice = add_on(Tier::Standard, YearMonthDay::days(5), "2024-01-01T00:00:00Z");
        let at = ts("2024-03-01T00:00:00Z");
        let window = DateWindow::starting_at(at, &invoice.period).unwrap();

        invoice.activate(window, at).unwrap();
        assert_eq!(invoice.window, Some(window));
        assert_eq!(invoice.consumed_at, Some(at));
        assert!(!invoice.is_pending_add_on());

        let again = invoice.activate(window, at);
        assert!(matches!(again, Err(SubscriptionError::InvoiceBuild(_))));
    }

    #[test]
    fn granted_invoice_is_never_pending() {
        let invoice = granted(
            Edition::standard_year(),
            OrderKind::Create,
            "2024-01-01T00:00:00Z",
            YearMonthDay::years(1),
        );
        assert!(!invoice.is_pending_add_on());
    }

    #[test]
    fn add_on_source_parse_inverts_as_str() {
        for source in [
            AddOnSource::CarryOver,
            AddOnSource::Compensation,
            AddOnSource::UserPurchase,
        ] {
            assert_eq!(AddOnSource::parse(source.as_str()), Some(source));
        }
    }
}
