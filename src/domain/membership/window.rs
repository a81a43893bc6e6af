//! Purchased window calculation.

use crate::domain::foundation::{DateWindow, Timestamp, YearMonthDay};

use super::{OrderKind, SubscriptionError};

/// Computes the `{start, end}` window a confirmed purchase grants.
pub struct PurchasedWindowCalculator;

impl PurchasedWindowCalculator {
    /// Window granted by a purchase of `kind` confirmed at `confirmed_at`.
    ///
    /// - Create / Renew start at the later of confirmation and current
    ///   expiration, so a late confirmation never shortens paid time and
    ///   never grants time retroactively.
    /// - Upgrade starts at confirmation; the old remainder is carried over
    ///   separately.
    /// - AddOn grants no window; its days are reserved.
    ///
    /// # Errors
    ///
    /// - `InvalidOrderKind` for `Deny`
    /// - `InvoiceBuild` if the period overflows the calendar
    pub fn compute(
        kind: OrderKind,
        confirmed_at: Timestamp,
        current_expiration: Option<Timestamp>,
        period: &YearMonthDay,
    ) -> Result<Option<DateWindow>, SubscriptionError> {
        let start = match kind {
            OrderKind::Create | OrderKind::Renew => {
                current_expiration.map_or(confirmed_at, |exp| confirmed_at.later_of(exp))
            }
            OrderKind::Upgrade => confirmed_at,
            OrderKind::AddOn => return Ok(None),
            OrderKind::Deny => {
                return Err(SubscriptionError::InvalidOrderKind(kind.to_string()));
            }
        };

        DateWindow::starting_at(start, period).map(Some).ok_or_else(|| {
            SubscriptionError::invoice_build(format!(
                "period {} overflows calendar from {}",
                period, start
            ))
        })
    }
}
