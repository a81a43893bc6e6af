//! In-memory adapters used by tests and local runs.

mod subscription_store;

pub use subscription_store::{FailPoint, InMemorySubscriptionStore, InMemoryTransaction};
