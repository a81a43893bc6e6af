//! Application handlers.
//!
//! Command handlers that orchestrate domain operations over the ports.

pub mod membership;

pub use membership::{
    ClaimAddOnsCommand, ClaimAddOnsHandler, ClaimAddOnsResult, ClientMetadata,
    ConfirmOrderHandler, ConfirmOrderResult, CreateOrderCommand, CreateOrderHandler,
};
