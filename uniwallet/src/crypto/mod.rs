//! Cryptographic primitives and operations
//!
//! Mnemonic handling, BIP-32 derivation, per-family address codecs and the
//! key manager.

pub mod mnemonic;
pub mod keys;

pub use mnemonic::{MnemonicStrength, Seed};
pub use keys::{ChainFamily, DerivationPath, KeyManager, PrivateKey};
