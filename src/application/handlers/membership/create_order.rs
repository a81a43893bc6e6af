//! CreateOrderHandler - Command handler for checkout.

use std::sync::Arc;

use crate::config::BillingConfig;
use crate::domain::foundation::{Timestamp, UserId};
use crate::domain::membership::{
    Offer, Order, OrderClassifier, PaymentIntent, PaymentMethod, Price, SubscriptionError,
};
use crate::ports::SubscriptionStore;

/// Describes the client that started checkout. Only logged.
#[derive(Debug, Clone, Default)]
pub struct ClientMetadata {
    pub client_type: Option<String>,
    pub client_version: Option<String>,
    pub user_ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Command to start a purchase.
#[derive(Debug, Clone)]
pub struct CreateOrderCommand {
    pub user_id: UserId,
    pub price: Price,
    pub offer: Option<Offer>,
    pub payment_method: PaymentMethod,
    /// Stripe subscription, Apple original transaction or B2B licence the
    /// purchase is billed through.
    pub provider_subscription_id: Option<String>,
    pub client: ClientMetadata,
    pub requested_at: Timestamp,
}

/// Handler for checkout.
///
/// Classifies the purchase against the buyer's membership as read without
/// locks. The kind stored here is provisional; confirmation re-classifies.
pub struct CreateOrderHandler {
    store: Arc<dyn SubscriptionStore>,
    classifier: OrderClassifier,
    /// Accepted price currency. Any currency when unset.
    currency: Option<String>,
}

impl CreateOrderHandler {
    pub fn new(store: Arc<dyn SubscriptionStore>, classifier: OrderClassifier) -> Self {
        Self {
            store,
            classifier,
            currency: None,
        }
    }

    /// Handler using the configured renewal ceiling and currency.
    pub fn from_config(store: Arc<dyn SubscriptionStore>, billing: &BillingConfig) -> Self {
        Self::new(store, billing.classifier()).with_currency(billing.currency.clone())
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    pub async fn handle(&self, cmd: CreateOrderCommand) -> Result<PaymentIntent, SubscriptionError> {
        let at = cmd.requested_at;

        // 1. Price must be on sale
        if !cmd.price.active {
            return Err(SubscriptionError::validation(
                "price_id",
                format!("price {} is not on sale", cmd.price.id),
            ));
        }
        if let Some(currency) = &self.currency {
            if &cmd.price.currency != currency {
                return Err(SubscriptionError::validation(
                    "currency",
                    format!(
                        "price {} is in {}, expected {}",
                        cmd.price.id, cmd.price.currency, currency
                    ),
                ));
            }
        }

        // 2. Classify against the current membership
        let membership = self.store.find_membership(&cmd.user_id).await?;
        let classification = self
            .classifier
            .classify(membership.as_ref(), &cmd.price.edition, at)
            .map_err(|e| SubscriptionError::validation("membership", e.to_string()))?;
        if let Some(reason) = classification.deny_reason {
            tracing::info!(
                user_id = %cmd.user_id,
                edition = %cmd.price.edition,
                reason = %reason,
                "Purchase denied at checkout"
            );
            return Err(SubscriptionError::ClassificationDenied(reason));
        }

        // 3. Offer must fit this purchase
        if let Some(offer) = &cmd.offer {
            let lapsed = membership.as_ref().map_or(false, |m| m.is_expired(at));
            offer.check_applicable(&cmd.price, classification.kind, lapsed, at)?;
        }

        // 4. Persist the order
        let order = Order::place(
            cmd.user_id,
            &cmd.price,
            cmd.offer.as_ref(),
            classification.kind,
            cmd.payment_method,
            at,
        )
        .with_provider_subscription(cmd.provider_subscription_id);
        self.store.save_order(&order).await?;

        tracing::info!(
            order_id = %order.id,
            user_id = %order.user_id,
            kind = %order.kind,
            charged_amount = order.charged_amount,
            payment_method = %order.payment_method,
            client_type = ?cmd.client.client_type,
            client_version = ?cmd.client.client_version,
            user_ip = ?cmd.client.user_ip,
            user_agent = ?cmd.client.user_agent,
            "Order created"
        );

        Ok(PaymentIntent {
            price: cmd.price,
            offer: cmd.offer,
            order,
            membership,
        })
    }
}
