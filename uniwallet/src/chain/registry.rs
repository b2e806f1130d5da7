//! Chain registry
//!
//! Maps a chain identifier to a factory that builds an adapter from a private
//! key. Registries are plain values built once by [`ChainRegistry::initialize`];
//! nothing registers itself behind the caller's back.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::config::{NetworkConfig, WalletConfig};
use crate::crypto::keys::{ChainFamily, PrivateKey};
use crate::error::{Error, Result};
use super::bitcoin::BitcoinAdapter;
use super::evm::EvmAdapter;
use super::types::ChainAdapter;

/// Builds an adapter from (private key, optional RPC override)
pub type AdapterFactory =
    Arc<dyn Fn(&PrivateKey, Option<&str>) -> Result<Box<dyn ChainAdapter>> + Send + Sync>;

/// Chain id -> adapter factory
#[derive(Clone, Default)]
pub struct ChainRegistry {
    factories: HashMap<String, AdapterFactory>,
}

impl ChainRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for every network in `config`
    pub fn initialize(config: &WalletConfig) -> Result<Self> {
        config.validate()?;

        let mut registry = Self::new();
        for (chain, network) in &config.networks {
            registry.register_network(chain, network.clone());
        }

        debug!(chains = registry.len(), "chain registry initialized");
        Ok(registry)
    }

    /// [`ChainRegistry::initialize`] over the built-in network table
    pub fn initialize_default() -> Result<Self> {
        Self::initialize(&WalletConfig::default())
    }

    /// Associate `chain` with `factory`. Re-registering replaces the old factory.
    pub fn register<F>(&mut self, chain: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&PrivateKey, Option<&str>) -> Result<Box<dyn ChainAdapter>> + Send + Sync + 'static,
    {
        self.factories.insert(chain.into(), Arc::new(factory));
        self
    }

    /// Register the built-in adapter for a network's family
    pub fn register_network(&mut self, chain: &str, network: NetworkConfig) -> &mut Self {
        let name = chain.to_string();
        match network.family {
            ChainFamily::Evm => self.register(chain, move |key, rpc_override| {
                let adapter = EvmAdapter::new(name.clone(), key, network.clone(), rpc_override)?;
                Ok(Box::new(adapter) as Box<dyn ChainAdapter>)
            }),
            ChainFamily::Bitcoin | ChainFamily::BitcoinTestnet => self.register(chain, move |key, rpc_override| {
                let adapter = BitcoinAdapter::new(name.clone(), key, network.clone(), rpc_override)?;
                Ok(Box::new(adapter) as Box<dyn ChainAdapter>)
            }),
        }
    }

    /// Build a fresh adapter for `chain`
    pub fn get(
        &self,
        chain: &str,
        private_key: &PrivateKey,
        rpc_override: Option<&str>,
    ) -> Result<Box<dyn ChainAdapter>> {
        let factory = self
            .factories
            .get(chain)
            .ok_or_else(|| Error::UnsupportedChain(chain.to_string()))?;

        factory(private_key, rpc_override)
    }

    pub fn contains(&self, chain: &str) -> bool {
        self.factories.contains_key(chain)
    }

    /// Registered chain ids, sorted
    pub fn chains(&self) -> Vec<String> {
        let mut chains: Vec<String> = self.factories.keys().cloned().collect();
        chains.sort();
        chains
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for ChainRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainRegistry")
            .field("chains", &self.chains())
            .finish()
    }
}
