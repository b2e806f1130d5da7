//! Network configuration
//!
//! The built-in table covers the EVM chains and Bitcoin networks the wallet
//! ships with. RPC endpoints can be replaced through the environment
//! (`ETHEREUM_RPC_URL`, `BITCOIN_RPC_URL`, ...) or a JSON document.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::crypto::keys::ChainFamily;
use crate::error::{Error, Result};

const DEFAULT_CONFIRMATION_TARGET: u16 = 6;

/// Connection and display parameters for one chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Key and address scheme
    pub family: ChainFamily,
    /// EIP-155 chain id (EVM only)
    #[serde(default)]
    pub chain_id: Option<u64>,
    /// JSON-RPC endpoint for EVM chains, explorer REST base for Bitcoin
    pub rpc_url: String,
    /// Native token symbol
    pub symbol: String,
    /// Native token decimals
    pub decimals: u8,
    /// Human-facing block explorer
    pub explorer_url: String,
    /// HTTP timeout in seconds; none by default
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Bitcoin fee target in blocks
    #[serde(default)]
    pub confirmation_target: Option<u16>,
    /// Token symbol -> contract address
    #[serde(default)]
    pub tokens: BTreeMap<String, String>,
}

impl NetworkConfig {
    /// An EVM network with no token table
    pub fn evm(chain_id: u64, rpc_url: &str, symbol: &str, explorer_url: &str) -> Self {
        Self {
            family: ChainFamily::Evm,
            chain_id: Some(chain_id),
            rpc_url: rpc_url.to_string(),
            symbol: symbol.to_string(),
            decimals: 18,
            explorer_url: explorer_url.to_string(),
            timeout_secs: None,
            confirmation_target: None,
            tokens: BTreeMap::new(),
        }
    }

    /// A Bitcoin network served by an Esplora-compatible explorer
    pub fn bitcoin(family: ChainFamily, rpc_url: &str, explorer_url: &str) -> Self {
        Self {
            family,
            chain_id: None,
            rpc_url: rpc_url.to_string(),
            symbol: "BTC".to_string(),
            decimals: 8,
            explorer_url: explorer_url.to_string(),
            timeout_secs: None,
            confirmation_target: Some(DEFAULT_CONFIRMATION_TARGET),
            tokens: BTreeMap::new(),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn confirmation_target(&self) -> u16 {
        self.confirmation_target.unwrap_or(DEFAULT_CONFIRMATION_TARGET)
    }

    /// Build the HTTP client this network's adapter talks through
    pub fn http_client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.timeout() {
            builder = builder.timeout(timeout);
        }
        builder
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))
    }

    fn validate(&self, chain: &str) -> Result<()> {
        if self.rpc_url.trim().is_empty() {
            return Err(Error::Config(format!("{}: rpc_url is empty", chain)));
        }
        if self.family == ChainFamily::Evm && self.chain_id.is_none() {
            return Err(Error::Config(format!("{}: EVM networks need a chain_id", chain)));
        }
        Ok(())
    }
}

/// The chain table a wallet is built from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletConfig {
    pub networks: BTreeMap<String, NetworkConfig>,
}

impl Default for WalletConfig {
    fn default() -> Self {
        let mut networks = BTreeMap::new();

        networks.insert("ethereum".to_string(), NetworkConfig::evm(1, "https://ethereum-rpc.publicnode.com", "ETH", "https://etherscan.io"));
        networks.insert("polygon".to_string(), NetworkConfig::evm(137, "https://polygon-rpc.com", "POL", "https://polygonscan.com"));
        networks.insert("bsc".to_string(), NetworkConfig::evm(56, "https://bsc-dataseed.binance.org", "BNB", "https://bscscan.com"));
        networks.insert("arbitrum".to_string(), NetworkConfig::evm(42161, "https://arb1.arbitrum.io/rpc", "ETH", "https://arbiscan.io"));
        networks.insert("optimism".to_string(), NetworkConfig::evm(10, "https://mainnet.optimism.io", "ETH", "https://optimistic.etherscan.io"));
        networks.insert("base".to_string(), NetworkConfig::evm(8453, "https://mainnet.base.org", "ETH", "https://basescan.org"));
        networks.insert("avalanche".to_string(), NetworkConfig::evm(43114, "https://api.avax.network/ext/bc/C/rpc", "AVAX", "https://snowtrace.io"));

        networks.insert(
            "bitcoin".to_string(),
            NetworkConfig::bitcoin(ChainFamily::Bitcoin, "https://blockstream.info/api", "https://blockstream.info"),
        );
        networks.insert(
            "bitcoin-testnet".to_string(),
            NetworkConfig::bitcoin(ChainFamily::BitcoinTestnet, "https://blockstream.info/testnet/api", "https://blockstream.info/testnet"),
        );

        Self { networks }
    }
}

impl WalletConfig {
    /// An empty table, for callers that register every network themselves
    pub fn empty() -> Self {
        Self { networks: BTreeMap::new() }
    }

    /// The built-in table with `<CHAIN>_RPC_URL` overrides applied
    pub fn from_env() -> Self {
        let mut config = Self::default();
        for (chain, network) in config.networks.iter_mut() {
            if let Ok(url) = std::env::var(env_key(chain)) {
                network.rpc_url = url;
            }
        }
        config
    }

    /// Parse a complete table from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Invalid wallet config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Add or replace a network
    pub fn insert(&mut self, chain: &str, network: NetworkConfig) -> &mut Self {
        self.networks.insert(chain.to_string(), network);
        self
    }

    pub fn network(&self, chain: &str) -> Option<&NetworkConfig> {
        self.networks.get(chain)
    }

    pub fn validate(&self) -> Result<()> {
        self.networks
            .iter()
            .try_for_each(|(chain, network)| network.validate(chain))
    }

    /// Chain -> derivation family, as the key manager needs it
    pub fn chain_families(&self) -> BTreeMap<String, ChainFamily> {
        self.networks
            .iter()
            .map(|(chain, network)| (chain.clone(), network.family))
            .collect()
    }
}

/// Environment variable that overrides a chain's RPC URL
pub fn env_key(chain: &str) -> String {
    format!("{}_RPC_URL", chain.to_ascii_uppercase().replace('-', "_"))
}
