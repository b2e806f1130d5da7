//! Chain adapter capability set

use async_trait::async_trait;
use ethers::types::U256;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::transaction::{format_amount, PaymentRequest};

/// Adapter connectivity. `connect` failure leaves an adapter `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
}

/// A balance in the token's smallest unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub amount: U256,
    pub decimals: u8,
    pub symbol: String,
}

impl Balance {
    pub fn formatted(&self) -> String {
        format_amount(self.amount, self.decimals)
    }
}

/// An estimated network fee, `amount = unit_price * units`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeEstimate {
    /// Total fee in the native token's smallest unit
    pub amount: U256,
    pub decimals: u8,
    pub symbol: String,
    /// Wei per gas or sat per vbyte
    pub unit_price: U256,
    /// Gas or vbytes
    pub units: u64,
}

impl FeeEstimate {
    pub fn formatted(&self) -> String {
        format_amount(self.amount, self.decimals)
    }
}

/// One chain's implementation of connect/address/balance/fee/send/sign.
///
/// Address derivation and message signing are local operations and work in
/// any state. Balance, fee and send require `Connected`.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    /// Chain identifier this adapter was built for
    fn chain(&self) -> &str;

    fn state(&self) -> ConnectionState;

    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Verify the backend is reachable
    async fn connect(&mut self) -> Result<()>;

    fn disconnect(&mut self);

    /// The adapter's own address
    fn address(&self) -> &str;

    /// Format-only check, never touches the network
    fn validate_address(&self, address: &str) -> bool;

    /// Native balance when `token` is None
    async fn get_balance(&self, token: Option<&str>) -> Result<Balance>;

    async fn estimate_fee(&self, request: &PaymentRequest) -> Result<FeeEstimate>;

    /// Sign and submit, returning the transaction id
    async fn send_transaction(&self, request: &PaymentRequest) -> Result<String>;

    fn sign_message(&self, message: &[u8]) -> Result<String>;

    fn explorer_address_url(&self, address: &str) -> String;

    fn explorer_tx_url(&self, txid: &str) -> String;

    fn require_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(Error::connection(self.chain(), "adapter is not connected"))
        }
    }

    /// Shared send preconditions: connection first, then recipient, then sender
    fn check_payment(&self, request: &PaymentRequest) -> Result<()> {
        self.require_connected()?;

        if !self.validate_address(&request.to) {
            return Err(Error::AddressValidationFailure(format!(
                "{} is not a valid {} address",
                request.to,
                self.chain()
            )));
        }

        if !request.from.eq_ignore_ascii_case(self.address()) {
            return Err(Error::AddressValidationFailure(format!(
                "sender {} is not this wallet's {} address",
                request.from,
                self.chain()
            )));
        }

        Ok(())
    }
}

/// Join an explorer base URL and a path without doubling slashes
pub(crate) fn explorer_url(base: &str, kind: &str, id: &str) -> String {
    format!("{}/{}/{}", base.trim_end_matches('/'), kind, id)
}
