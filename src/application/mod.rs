//! Application layer - Commands and Handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! Every handler that changes money-bearing state does so inside one
//! row-locked transaction.

pub mod handlers;

pub use handlers::{
    ClaimAddOnsCommand, ClaimAddOnsHandler, ClaimAddOnsResult, ClientMetadata,
    ConfirmOrderHandler, ConfirmOrderResult, CreateOrderCommand, CreateOrderHandler,
};
