//! Wallet implementation

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use futures::future::join_all;
use tracing::{info, instrument, warn};
use zeroize::Zeroizing;

use crate::chain::{Balance, ChainAdapter, ChainRegistry, FeeEstimate};
use crate::config::WalletConfig;
use crate::crypto::keys::{KeyManager, PrivateKey};
use crate::crypto::mnemonic::Seed;
use crate::error::{Error, Result};
use crate::transaction::PaymentRequest;

/// One seed, many chains.
///
/// Every operation derives the chain's key through the [`KeyManager`] and
/// builds a fresh adapter from the [`ChainRegistry`]. Only
/// [`Wallet::get_addresses`] tolerates an unreachable backend.
pub struct Wallet {
    keys: KeyManager,
    registry: ChainRegistry,
    rpc_overrides: HashMap<String, String>,
}

impl Wallet {
    /// Create a wallet over the built-in chain families and `registry`
    pub fn new(phrase: &str, registry: ChainRegistry) -> Result<Self> {
        Ok(Self {
            keys: KeyManager::new(phrase)?,
            registry,
            rpc_overrides: HashMap::new(),
        })
    }

    /// Create a wallet whose chains and keys both come from `config`
    pub fn from_config(phrase: &str, passphrase: Option<&str>, config: &WalletConfig) -> Result<Self> {
        let registry = ChainRegistry::initialize(config)?;
        let keys = KeyManager::with_chains(phrase, passphrase, config.chain_families())?;

        Ok(Self {
            keys,
            registry,
            rpc_overrides: HashMap::new(),
        })
    }

    /// Create a wallet with a freshly generated 12-word phrase
    pub fn generate(config: &WalletConfig) -> Result<Self> {
        let seed = Seed::generate()?;
        Self::from_config(seed.phrase(), None, config)
    }

    /// Point one chain's adapters at a different endpoint
    pub fn with_rpc_override(mut self, chain: impl Into<String>, url: impl Into<String>) -> Self {
        self.rpc_overrides.insert(chain.into(), url.into());
        self
    }

    /// Registered chains that also have a derivation family, sorted
    pub fn chains(&self) -> Vec<String> {
        self.registry
            .chains()
            .into_iter()
            .filter(|chain| self.keys.family_of(chain).is_ok())
            .collect()
    }

    pub fn registry(&self) -> &ChainRegistry {
        &self.registry
    }

    /// Build a disconnected adapter. The registry is consulted before any derivation.
    pub fn adapter(&self, chain: &str) -> Result<Box<dyn ChainAdapter>> {
        if !self.registry.contains(chain) {
            return Err(Error::UnsupportedChain(chain.to_string()));
        }

        let key = self.keys.derive_private_key(chain)?;
        let rpc_override = self.rpc_overrides.get(chain).map(String::as_str);
        self.registry.get(chain, &key, rpc_override)
    }

    async fn connected_adapter(&self, chain: &str) -> Result<Box<dyn ChainAdapter>> {
        let mut adapter = self.adapter(chain)?;
        adapter.connect().await?;
        Ok(adapter)
    }

    /// Address on every known chain. Connection failures are logged and ignored.
    #[instrument(skip(self))]
    pub async fn get_addresses(&self) -> Result<BTreeMap<String, String>> {
        let lookups = self.chains().into_iter().map(|chain| self.best_effort_address(chain));
        join_all(lookups).await.into_iter().collect()
    }

    async fn best_effort_address(&self, chain: String) -> Result<(String, String)> {
        let mut adapter = self.adapter(&chain)?;

        match adapter.connect().await {
            Ok(()) => {}
            Err(e @ Error::ConnectionFailure { .. }) => {
                warn!(chain = %chain, error = %e, "backend unavailable, returning address only");
            }
            Err(e) => return Err(e),
        }

        Ok((chain, adapter.address().to_string()))
    }

    #[instrument(skip(self))]
    pub async fn get_balance(&self, chain: &str, token: Option<&str>) -> Result<Balance> {
        self.connected_adapter(chain).await?.get_balance(token).await
    }

    #[instrument(skip(self, request), fields(chain = %request.chain))]
    pub async fn estimate_fee(&self, request: &PaymentRequest) -> Result<FeeEstimate> {
        self.connected_adapter(&request.chain).await?.estimate_fee(request).await
    }

    #[instrument(skip(self, request), fields(chain = %request.chain))]
    pub async fn send_payment(&self, request: &PaymentRequest) -> Result<String> {
        let tx_id = self
            .connected_adapter(&request.chain)
            .await?
            .send_transaction(request)
            .await?;

        info!(%tx_id, "payment submitted");
        Ok(tx_id)
    }

    #[instrument(skip(self, message))]
    pub async fn sign_message(&self, message: &[u8], chain: &str) -> Result<String> {
        self.connected_adapter(chain).await?.sign_message(message)
    }

    /// The seed phrase. Callers are responsible for handling it securely.
    pub fn export_seed(&self) -> Zeroizing<String> {
        self.keys.export_seed()
    }

    /// Every chain's private key. Callers are responsible for handling them securely.
    pub fn export_all_keys(&self) -> Result<BTreeMap<String, PrivateKey>> {
        self.keys.export_all()
    }

    /// Drop every cached key
    pub fn clear_keys(&self) {
        self.keys.clear();
    }
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("chains", &self.chains())
            .field("rpc_overrides", &self.rpc_overrides)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkConfig;
    use crate::crypto::mnemonic;

    const PHRASE: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn test_wallet_from_phrase() {
        let wallet = Wallet::new(PHRASE, ChainRegistry::initialize_default().unwrap()).unwrap();
        assert!(wallet.chains().contains(&"ethereum".to_string()));
        assert_eq!(wallet.export_seed().as_str(), PHRASE);
    }

    #[test]
    fn test_invalid_phrase_is_rejected() {
        let err = Wallet::new("abandon about", ChainRegistry::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidSeedPhrase(_)));
    }

    #[test]
    fn test_generate() {
        let wallet = Wallet::generate(&WalletConfig::default()).unwrap();
        assert!(mnemonic::validate(wallet.export_seed().as_str()));
        assert_eq!(wallet.export_seed().split_whitespace().count(), 12);
    }

    #[test]
    fn test_chains_need_a_key_family() {
        let mut registry = ChainRegistry::initialize_default().unwrap();
        registry.register("solana", |_, _| Err(Error::UnsupportedChain("solana".to_string())));

        let wallet = Wallet::new(PHRASE, registry).unwrap();
        assert!(wallet.registry().contains("solana"));
        assert!(!wallet.chains().contains(&"solana".to_string()));
    }

    #[test]
    fn test_unregistered_chain_fails_before_derivation() {
        let wallet = Wallet::new(PHRASE, ChainRegistry::new()).unwrap();
        let err = wallet.adapter("ethereum").err().unwrap();

        assert!(matches!(err, Error::UnsupportedChain(_)));
        assert!(wallet.keys.cached_chains().is_empty());
    }

    #[test]
    fn test_rpc_override_reaches_factory() {
        let mut config = WalletConfig::empty();
        config.insert("bitcoin", NetworkConfig::bitcoin(
            crate::crypto::keys::ChainFamily::Bitcoin,
            "https://blockstream.info/api",
            "https://blockstream.info",
        ));

        let wallet = Wallet::from_config(PHRASE, None, &config)
            .unwrap()
            .with_rpc_override("bitcoin", "http://127.0.0.1:1");

        let adapter = wallet.adapter("bitcoin").unwrap();
        assert_eq!(adapter.address(), "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu");
        assert_eq!(wallet.chains(), vec!["bitcoin".to_string()]);
    }

    #[test]
    fn test_debug_does_not_leak() {
        let wallet = Wallet::new(PHRASE, ChainRegistry::initialize_default().unwrap()).unwrap();
        assert!(!format!("{:?}", wallet).contains("abandon"));
    }
}
