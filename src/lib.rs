//! Paywall Subscriptions - Subscription lifecycle and proration engine
//!
//! Turns confirmed payments into membership entitlements: classifies each
//! purchase against the buyer's membership, computes the access it grants,
//! records invoices, and preserves unused paid time across plan changes.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod observability;
pub mod ports;
