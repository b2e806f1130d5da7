//! EVM chain adapter
//!
//! One implementation serves every EVM network; the chain id, RPC endpoint
//! and native token come from the network's [`NetworkConfig`]. Transactions
//! are EIP-1559, signed locally and submitted with `eth_sendRawTransaction`.

use std::cmp;
use std::sync::Arc;

use async_trait::async_trait;
use ethers::contract::abigen;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, BlockNumber, Bytes, Eip1559TransactionRequest, U256};
use ethers::utils::hash_message;
use ethers_providers::{Http, Middleware, Provider, ProviderError, RpcError};
use ethers_signers::{LocalWallet, Signer};
use reqwest::Url;
use tracing::{debug, info, instrument};

use crate::config::NetworkConfig;
use crate::crypto::keys::{ethereum, ChainFamily, PrivateKey};
use crate::error::{Error, Result};
use crate::transaction::{parse_amount, FeeOverrides, PaymentRequest};
use super::types::{explorer_url, Balance, ChainAdapter, ConnectionState, FeeEstimate};

/// Gas used by a plain value transfer
pub const NATIVE_TRANSFER_GAS: u64 = 21_000;

const ONE_GWEI: u64 = 1_000_000_000;

abigen!(
    Erc20,
    r#"[
        function balanceOf(address owner) external view returns (uint256)
        function decimals() external view returns (uint8)
        function symbol() external view returns (string)
        function transfer(address to, uint256 amount) external returns (bool)
    ]"#
);

/// What a payment moves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Asset {
    Native,
    Token(Address),
}

/// A transfer ready to be priced and signed
#[derive(Debug, Clone)]
struct Transfer {
    to: Address,
    value: U256,
    data: Option<Bytes>,
}

/// EVM adapter
pub struct EvmAdapter {
    chain: String,
    network: NetworkConfig,
    chain_id: u64,
    wallet: LocalWallet,
    address: String,
    provider: Arc<Provider<Http>>,
    state: ConnectionState,
}

impl EvmAdapter {
    /// Build an adapter. No network I/O happens until [`ChainAdapter::connect`].
    pub fn new(
        chain: impl Into<String>,
        private_key: &PrivateKey,
        network: NetworkConfig,
        rpc_override: Option<&str>,
    ) -> Result<Self> {
        let chain = chain.into();

        if private_key.family() != ChainFamily::Evm {
            return Err(Error::InsufficientKeyMaterial(format!("{} needs an EVM key", chain)));
        }

        let chain_id = network
            .chain_id
            .ok_or_else(|| Error::Config(format!("{}: EVM networks need a chain_id", chain)))?;

        let rpc_url = rpc_override.unwrap_or(&network.rpc_url);
        let url = Url::parse(rpc_url)
            .map_err(|e| Error::Config(format!("{}: invalid RPC URL {}: {}", chain, rpc_url, e)))?;
        let provider = Provider::new(Http::new_with_client(url, network.http_client()?));

        let wallet = LocalWallet::from_bytes(private_key.as_bytes())
            .map_err(|e| Error::KeyDerivation(format!("Invalid private key: {}", e)))?
            .with_chain_id(chain_id);
        let address = ethereum::address_from_private_key(private_key)?;

        Ok(Self {
            chain,
            network,
            chain_id,
            wallet,
            address,
            provider: Arc::new(provider),
            state: ConnectionState::Disconnected,
        })
    }

    /// Get the chain ID
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn erc20(&self, address: Address) -> Erc20<Provider<Http>> {
        Erc20::new(address, Arc::clone(&self.provider))
    }

    /// Native symbol (or none), a configured token symbol, or a contract address
    fn resolve_asset(&self, token: Option<&str>) -> Result<Asset> {
        let token = match token {
            None => return Ok(Asset::Native),
            Some(token) if token.eq_ignore_ascii_case(&self.network.symbol) => return Ok(Asset::Native),
            Some(token) => token,
        };

        let contract = self
            .network
            .tokens
            .iter()
            .find(|(symbol, _)| symbol.eq_ignore_ascii_case(token))
            .map(|(_, address)| address.as_str())
            .unwrap_or(token);

        if !ethereum::validate_address(contract) {
            return Err(Error::UnsupportedToken {
                chain: self.chain.clone(),
                token: token.to_string(),
            });
        }

        contract
            .parse::<Address>()
            .map(Asset::Token)
            .map_err(|e| Error::UnsupportedToken {
                chain: self.chain.clone(),
                token: format!("{} ({})", token, e),
            })
    }

    async fn prepare_transfer(&self, request: &PaymentRequest) -> Result<Transfer> {
        let recipient = parse_address(&request.to)?;

        match self.resolve_asset(request.token.as_deref())? {
            Asset::Native => Ok(Transfer {
                to: recipient,
                value: parse_amount(&request.amount, self.network.decimals)?,
                data: None,
            }),
            Asset::Token(contract_address) => {
                let contract = self.erc20(contract_address);
                let decimals = contract
                    .decimals()
                    .call()
                    .await
                    .map_err(|e| Error::connection(&self.chain, e))?;
                let amount = parse_amount(&request.amount, decimals)?;
                let data = contract
                    .transfer(recipient, amount)
                    .calldata()
                    .ok_or_else(|| Error::TransactionFailure("Failed to encode token transfer".to_string()))?;

                Ok(Transfer {
                    to: contract_address,
                    value: U256::zero(),
                    data: Some(data),
                })
            }
        }
    }

    fn transaction_request(&self, transfer: &Transfer) -> Eip1559TransactionRequest {
        let mut tx = Eip1559TransactionRequest::new()
            .from(self.wallet.address())
            .to(transfer.to)
            .value(transfer.value)
            .chain_id(self.chain_id);

        if let Some(data) = &transfer.data {
            tx = tx.data(data.clone());
        }

        tx
    }

    async fn gas_limit(&self, transfer: &Transfer, overrides: &FeeOverrides) -> Result<U256> {
        if let Some(limit) = overrides.gas_limit {
            return Ok(U256::from(limit));
        }
        if transfer.data.is_none() {
            return Ok(U256::from(NATIVE_TRANSFER_GAS));
        }

        let tx: TypedTransaction = self.transaction_request(transfer).into();
        self.provider
            .estimate_gas(&tx, None)
            .await
            .map_err(|e| rejection_or_connection(&self.chain, e))
    }

    /// (max_fee_per_gas, max_priority_fee_per_gas)
    async fn fee_caps(&self, overrides: &FeeOverrides) -> Result<(U256, U256)> {
        if let (Some(max_fee), Some(priority)) =
            (overrides.max_fee_per_gas, overrides.max_priority_fee_per_gas)
        {
            return Ok((max_fee, cmp::min(priority, max_fee)));
        }

        let gas_price = self
            .provider
            .get_gas_price()
            .await
            .map_err(|e| Error::connection(&self.chain, e))?;
        debug!(chain = %self.chain, %gas_price, "gas price");

        Ok(fee_caps_from_gas_price(gas_price, overrides))
    }
}

/// `max_fee = 2 * gas_price`, `priority = max(gas_price / 10, 1 gwei)`, overrides win.
/// The tip never exceeds `max_fee`.
fn fee_caps_from_gas_price(gas_price: U256, overrides: &FeeOverrides) -> (U256, U256) {
    let priority = overrides
        .max_priority_fee_per_gas
        .unwrap_or_else(|| cmp::max(gas_price / 10, U256::from(ONE_GWEI)));
    let max_fee = overrides
        .max_fee_per_gas
        .unwrap_or_else(|| cmp::max(gas_price.saturating_mul(U256::from(2)), priority));

    (max_fee, cmp::min(priority, max_fee))
}

/// A JSON-RPC error object means the node evaluated and refused the call
/// (a revert, insufficient funds). Anything else is a transport failure.
fn rejection_or_connection(chain: &str, err: ProviderError) -> Error {
    match err.as_error_response() {
        Some(response) => Error::TransactionFailure(response.message.clone()),
        None => Error::connection(chain, err),
    }
}

fn parse_address(address: &str) -> Result<Address> {
    if !ethereum::validate_address(address) {
        return Err(Error::AddressValidationFailure(format!("{} is not a valid EVM address", address)));
    }
    address
        .parse::<Address>()
        .map_err(|e| Error::AddressValidationFailure(format!("{}: {}", address, e)))
}

#[async_trait]
impl ChainAdapter for EvmAdapter {
    fn chain(&self) -> &str {
        &self.chain
    }

    fn state(&self) -> ConnectionState {
        self.state
    }

    #[instrument(skip(self), fields(chain = %self.chain))]
    async fn connect(&mut self) -> Result<()> {
        self.state = ConnectionState::Disconnected;

        let remote = self
            .provider
            .get_chainid()
            .await
            .map_err(|e| Error::connection(&self.chain, e))?;

        if remote != U256::from(self.chain_id) {
            return Err(Error::connection(
                &self.chain,
                format!("endpoint reports chain id {}, expected {}", remote, self.chain_id),
            ));
        }

        self.state = ConnectionState::Connected;
        info!("connected");
        Ok(())
    }

    fn disconnect(&mut self) {
        self.state = ConnectionState::Disconnected;
    }

    fn address(&self) -> &str {
        &self.address
    }

    fn validate_address(&self, address: &str) -> bool {
        ethereum::validate_address(address)
    }

    #[instrument(skip(self), fields(chain = %self.chain))]
    async fn get_balance(&self, token: Option<&str>) -> Result<Balance> {
        self.require_connected()?;
        let owner = self.wallet.address();

        match self.resolve_asset(token)? {
            Asset::Native => {
                let amount = self
                    .provider
                    .get_balance(owner, None)
                    .await
                    .map_err(|e| Error::connection(&self.chain, e))?;

                Ok(Balance {
                    amount,
                    decimals: self.network.decimals,
                    symbol: self.network.symbol.clone(),
                })
            }
            Asset::Token(address) => {
                let contract = self.erc20(address);
                let amount = contract
                    .balance_of(owner)
                    .call()
                    .await
                    .map_err(|e| Error::connection(&self.chain, e))?;
                let decimals = contract
                    .decimals()
                    .call()
                    .await
                    .map_err(|e| Error::connection(&self.chain, e))?;
                let symbol = contract
                    .symbol()
                    .call()
                    .await
                    .map_err(|e| Error::connection(&self.chain, e))?;

                Ok(Balance { amount, decimals, symbol })
            }
        }
    }

    #[instrument(skip(self, request), fields(chain = %self.chain))]
    async fn estimate_fee(&self, request: &PaymentRequest) -> Result<FeeEstimate> {
        self.require_connected()?;

        let transfer = self.prepare_transfer(request).await?;
        let gas_limit = self.gas_limit(&transfer, &request.fees).await?;
        let (max_fee, _) = self.fee_caps(&request.fees).await?;

        Ok(FeeEstimate {
            amount: gas_limit.saturating_mul(max_fee),
            decimals: self.network.decimals,
            symbol: self.network.symbol.clone(),
            unit_price: max_fee,
            units: gas_limit.low_u64(),
        })
    }

    #[instrument(skip(self, request), fields(chain = %self.chain, to = %request.to))]
    async fn send_transaction(&self, request: &PaymentRequest) -> Result<String> {
        self.check_payment(request)?;

        let transfer = self.prepare_transfer(request).await?;
        let gas_limit = self.gas_limit(&transfer, &request.fees).await?;
        let (max_fee, priority) = self.fee_caps(&request.fees).await?;

        let nonce = match request.fees.nonce {
            Some(nonce) => U256::from(nonce),
            None => self
                .provider
                .get_transaction_count(self.wallet.address(), Some(BlockNumber::Pending.into()))
                .await
                .map_err(|e| Error::connection(&self.chain, e))?,
        };

        let tx: TypedTransaction = self
            .transaction_request(&transfer)
            .nonce(nonce)
            .gas(gas_limit)
            .max_fee_per_gas(max_fee)
            .max_priority_fee_per_gas(priority)
            .into();

        let signature = self
            .wallet
            .sign_transaction_sync(&tx)
            .map_err(|e| Error::Signing(format!("Failed to sign transaction: {}", e)))?;

        let pending = self
            .provider
            .send_raw_transaction(tx.rlp_signed(&signature))
            .await
            .map_err(|e| Error::TransactionFailure(e.to_string()))?;

        let tx_id = format!("0x{}", hex::encode(pending.tx_hash().as_bytes()));
        info!(%tx_id, "transaction submitted");
        Ok(tx_id)
    }

    /// EIP-191 `personal_sign`, returned as 0x-prefixed r||s||v
    fn sign_message(&self, message: &[u8]) -> Result<String> {
        let signature = self
            .wallet
            .sign_hash(hash_message(message))
            .map_err(|e| Error::Signing(format!("Failed to sign message: {}", e)))?;

        Ok(format!("0x{}", hex::encode(signature.to_vec())))
    }

    fn explorer_address_url(&self, address: &str) -> String {
        explorer_url(&self.network.explorer_url, "address", address)
    }

    fn explorer_tx_url(&self, txid: &str) -> String {
        explorer_url(&self.network.explorer_url, "tx", txid)
    }
}
