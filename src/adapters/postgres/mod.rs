//! PostgreSQL adapters - Database implementations for repository ports.
//!
//! - `PostgresSubscriptionStore` - Orders, invoices, memberships and snapshots
//!   with row-locked transactions

mod subscription_store;

pub use subscription_store::{PostgresSubscriptionStore, PostgresSubscriptionTransaction};
