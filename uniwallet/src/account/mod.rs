//! Account management functionality
//!
//! The [`Wallet`] ties the key manager to the chain registry and exposes
//! chain-agnostic operations.

mod wallet;

pub use wallet::*;
