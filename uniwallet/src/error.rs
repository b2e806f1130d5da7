//! Error types for the uniwallet library

use thiserror::Error;

/// Custom error type for uniwallet operations
#[derive(Error, Debug)]
pub enum Error {
    /// The mnemonic failed checksum or word-list validation
    #[error("Invalid seed phrase: {0}")]
    InvalidSeedPhrase(String),

    /// No adapter factory is registered for the chain
    #[error("Unsupported chain: {0}")]
    UnsupportedChain(String),

    /// The chain backend could not be reached or answered with an error
    #[error("Connection failure on {chain}: {reason}")]
    ConnectionFailure { chain: String, reason: String },

    /// An address did not match the chain's format
    #[error("Address validation failure: {0}")]
    AddressValidationFailure(String),

    /// A transaction was rejected during construction or submission
    #[error("Transaction failure: {0}")]
    TransactionFailure(String),

    /// Keys were requested for a chain with no known derivation family
    #[error("Insufficient key material: {0}")]
    InsufficientKeyMaterial(String),

    #[error("Key derivation error: {0}")]
    KeyDerivation(String),

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Token {token} is not supported on {chain}")]
    UnsupportedToken { chain: String, token: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Build a connection failure for `chain` from any displayable cause
    pub fn connection(chain: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::ConnectionFailure {
            chain: chain.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the caller may retry the failed operation unchanged.
    /// Nothing in this crate retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectionFailure { .. })
    }
}

/// Result type for uniwallet operations
pub type Result<T> = std::result::Result<T, Error>;
