//! Key derivation and management
//!
//! This module provides functionality for deriving and managing keys for
//! different blockchains.

pub mod ethereum;
pub mod bitcoin;
pub mod manager;
mod derivation;

pub use derivation::*;
pub use manager::KeyManager;
