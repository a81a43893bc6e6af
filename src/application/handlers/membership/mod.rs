//! Membership handlers.
//!
//! Command handlers for the subscription lifecycle:
//!
//! - Checkout: classify a purchase and persist its order
//! - Confirmation: apply a verified payment exactly once
//! - Add-on claim: turn reserved days into access after expiry

mod claim_add_ons;
mod confirm_order;
mod create_order;
mod transaction;

pub use claim_add_ons::{ClaimAddOnsCommand, ClaimAddOnsHandler, ClaimAddOnsResult};
pub use confirm_order::{ConfirmOrderHandler, ConfirmOrderResult};
pub use create_order::{ClientMetadata, CreateOrderCommand, CreateOrderHandler};
