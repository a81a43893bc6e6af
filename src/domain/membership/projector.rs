//! Applies invoices to memberships.

use crate::domain::foundation::{MembershipId, Timestamp, UserId};

use super::{AddOnBalance, Invoice, Membership, PaymentMethod, SubscriptionError};

/// Pure projection of an invoice onto a membership.
///
/// Applying the same invoice twice applies it twice. Guarding against that
/// is the confirmation transaction's job.
pub struct MembershipProjector;

impl MembershipProjector {
    /// Returns `membership` with `invoice` applied.
    ///
    /// A windowed invoice replaces edition and expiration. A windowless one
    /// only adds its days to the reserved balance of its tier.
    pub fn apply(mut membership: Membership, invoice: &Invoice) -> Membership {
        let at = invoice.consumed_at.unwrap_or(invoice.created_at);

        let Some(window) = invoice.window else {
            membership
                .add_on
                .add(invoice.edition.tier, invoice.day_count());
            membership.touch(at);
            return membership;
        };

        membership.edition = invoice.edition;
        membership.expires_at = window.end;

        // Activated add-ons extend access without changing how it is billed.
        if invoice.add_on_source.is_none() {
            if let Some(method) = invoice.payment_method {
                let id = invoice.provider_subscription_id.clone();
                Self::switch_billing(&mut membership, method, id);
            }
        }

        membership.touch(at);
        membership
    }

    /// Points the membership at `method`, keeping only that channel's id.
    ///
    /// A recurring order without an id keeps the id already on file for the
    /// same channel.
    fn switch_billing(membership: &mut Membership, method: PaymentMethod, id: Option<String>) {
        let previous = membership.payment_method;
        let keep = |current: &mut Option<String>, channel: PaymentMethod| {
            let retained = if previous == Some(channel) { current.take() } else { None };
            *current = if method == channel { id.clone().or(retained) } else { None };
        };

        keep(&mut membership.stripe_subscription_id, PaymentMethod::Stripe);
        keep(&mut membership.apple_subscription_id, PaymentMethod::Apple);
        keep(&mut membership.b2b_licence_id, PaymentMethod::B2b);

        membership.payment_method = Some(method);
        membership.auto_renewal = method.is_recurring();
    }

    /// Builds a buyer's first membership from a windowed invoice.
    ///
    /// # Errors
    ///
    /// `Validation` if the invoice grants no window.
    pub fn create(user_id: UserId, invoice: &Invoice) -> Result<Membership, SubscriptionError> {
        let window = invoice.window.ok_or_else(|| {
            SubscriptionError::validation(
                "invoice",
                format!("invoice {} grants no window to start a membership", invoice.id),
            )
        })?;
        let at: Timestamp = invoice.consumed_at.unwrap_or(invoice.created_at);

        let blank = Membership {
            id: MembershipId::new(),
            user_id,
            edition: invoice.edition,
            expires_at: window.start,
            payment_method: None,
            auto_renewal: false,
            stripe_subscription_id: None,
            apple_subscription_id: None,
            b2b_licence_id: None,
            add_on: AddOnBalance::default(),
            created_at: at,
            updated_at: at,
        };

        Ok(Self::apply(blank, invoice))
    }
}
