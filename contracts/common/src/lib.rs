//! CDP Shield Common Library
//!
//! Shared types, constants, and utilities for all CDP Shield contracts.
//! This crate provides the foundation the other contracts build on.
//!
//! ## Model
//!
//! - **Contracts as values**: each contract is a plain struct with an address
//! - **Injected dependencies**: venues are passed into calls through traits in `interfaces`
//! - **One ledger**: every token movement goes through `TokenLedger`
//! - **Typed events**: each contract keeps an `EventLog` of `ShieldEvent`s
//!
//! Amounts are 18-decimal `u128` base units; prices and health factors are WAD.

pub mod constants;
pub mod errors;
pub mod types;
pub mod math;
pub mod events;
pub mod config;
pub mod ledger;
pub mod interfaces;
pub mod access_control;

// Re-exports for convenience
pub use errors::*;
pub use types::*;
pub use math::*;
pub use events::*;
pub use config::ShieldConfig;
pub use ledger::{TokenInfo, TokenLedger};
pub use interfaces::*;
pub use access_control::{Ownable, Pausable};
