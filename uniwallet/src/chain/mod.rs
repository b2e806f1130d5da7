//! Chain adapters
//!
//! A uniform capability set over heterogeneous backends: one EVM adapter
//! parameterized by chain id, one Bitcoin adapter over an explorer REST API,
//! and the registry that builds them.

pub mod types;
pub mod evm;
pub mod bitcoin;
pub mod registry;

pub use types::*;
pub use evm::EvmAdapter;
pub use self::bitcoin::{BitcoinAdapter, TransactionSummary};
pub use registry::{AdapterFactory, ChainRegistry};
