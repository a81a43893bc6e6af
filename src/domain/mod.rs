//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, timestamps, calendar periods, errors)
//! - `membership` - Orders, invoices, memberships and the rules that connect them

pub mod foundation;
pub mod membership;
