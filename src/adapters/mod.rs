//! Adapters - Implementations of port interfaces.
//!
//! - `postgres` - sqlx-backed store with `FOR UPDATE` row locks
//! - `memory` - In-process store with the same transaction semantics, for tests

pub mod memory;
pub mod postgres;

pub use memory::{FailPoint, InMemorySubscriptionStore};
pub use postgres::PostgresSubscriptionStore;
