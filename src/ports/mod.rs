//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! - `SubscriptionStore` - Unlocked reads, order creation, transaction factory
//! - `SubscriptionTransaction` - Row-locked reads and writes committed atomically

mod subscription_store;
mod subscription_transaction;

pub use subscription_store::SubscriptionStore;
pub use subscription_transaction::SubscriptionTransaction;
