//! Common transaction types

use ethers::types::U256;
use serde::{Deserialize, Serialize};

/// Caller-supplied values that replace the ones an adapter would query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeOverrides {
    /// Gas limit (for EVM chains)
    pub gas_limit: Option<u64>,
    /// EIP-1559 fee cap in wei (for EVM chains)
    pub max_fee_per_gas: Option<U256>,
    /// EIP-1559 tip in wei (for EVM chains)
    pub max_priority_fee_per_gas: Option<U256>,
    /// Nonce (for EVM chains)
    pub nonce: Option<u64>,
    /// Fee rate in sat/vB (for Bitcoin)
    pub fee_rate: Option<u64>,
}

impl FeeOverrides {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// A transfer from the wallet's own address on one chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    /// Chain identifier, e.g. "ethereum" or "bitcoin"
    pub chain: String,
    /// Sender address; must be the wallet's address on `chain`
    pub from: String,
    /// Recipient address
    pub to: String,
    /// Decimal amount in whole units, e.g. "0.01"
    pub amount: String,
    /// Token symbol or contract address. None means the native token.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub fees: FeeOverrides,
}

impl PaymentRequest {
    /// A native-token transfer with no fee overrides
    pub fn new(
        chain: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        amount: impl Into<String>,
    ) -> Self {
        Self {
            chain: chain.into(),
            from: from.into(),
            to: to.into(),
            amount: amount.into(),
            token: None,
            fees: FeeOverrides::default(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_fees(mut self, fees: FeeOverrides) -> Self {
        self.fees = fees;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let request = PaymentRequest::new("ethereum", "0xaa", "0xbb", "0.01")
            .with_token("USDC")
            .with_fees(FeeOverrides {
                nonce: Some(7),
                ..Default::default()
            });

        assert_eq!(request.chain, "ethereum");
        assert_eq!(request.token.as_deref(), Some("USDC"));
        assert_eq!(request.fees.nonce, Some(7));
        assert!(!request.fees.is_empty());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let request: PaymentRequest = serde_json::from_str(
            r#"{"chain":"bitcoin","from":"bc1qa","to":"bc1qb","amount":"0.5"}"#,
        )
        .unwrap();

        assert!(request.token.is_none());
        assert!(request.fees.is_empty());
    }
}
