//! Uniwallet - one seed, many chains
//!
//! This library derives chain-specific signing keys from a single BIP-39
//! mnemonic and exposes a uniform adapter interface over EVM and Bitcoin
//! backends: addresses, balances, fee estimates, payments and message signing.

pub mod error;
pub mod config;
pub mod crypto;
pub mod chain;
pub mod transaction;
pub mod account;

// Re-export commonly used types for convenience
pub use error::{Error, Result};
pub use account::Wallet;
pub use chain::{Balance, ChainAdapter, ChainRegistry, ConnectionState, FeeEstimate};
pub use config::{NetworkConfig, WalletConfig};
pub use crypto::{ChainFamily, KeyManager, PrivateKey, Seed};
pub use transaction::{FeeOverrides, PaymentRequest};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
