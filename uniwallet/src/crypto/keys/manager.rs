//! Per-chain key derivation with a lifetime cache

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::RwLock;

use tracing::debug;
use zeroize::Zeroizing;

use crate::crypto::mnemonic::Seed;
use crate::error::{Error, Result};
use super::derivation::{derive_private_key, ChainFamily, DerivationPath, PrivateKey};

/// Derives one private key per chain from a validated seed phrase.
///
/// Construction is the only place the phrase is validated. Keys are derived
/// lazily on first request and cached until [`KeyManager::clear`]. Derivation
/// is a pure function of (seed, chain) so concurrent first requests for the
/// same chain can at worst derive twice and store the same value.
pub struct KeyManager {
    seed: Seed,
    seed_bytes: Zeroizing<[u8; 64]>,
    chains: BTreeMap<String, ChainFamily>,
    cache: RwLock<HashMap<String, PrivateKey>>,
}

impl KeyManager {
    /// Create a manager for the built-in chain table
    pub fn new(phrase: &str) -> Result<Self> {
        Self::with_chains(phrase, None, crate::config::WalletConfig::default().chain_families())
    }

    /// Create a manager for an explicit chain -> family table
    pub fn with_chains(
        phrase: &str,
        passphrase: Option<&str>,
        chains: BTreeMap<String, ChainFamily>,
    ) -> Result<Self> {
        let seed = Seed::from_phrase(phrase)?;
        let seed_bytes = seed.to_seed_bytes(passphrase)?;

        Ok(Self {
            seed,
            seed_bytes,
            chains,
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// Chains this manager can derive keys for
    pub fn chains(&self) -> impl Iterator<Item = &str> {
        self.chains.keys().map(String::as_str)
    }

    pub fn family_of(&self, chain: &str) -> Result<ChainFamily> {
        self.chains
            .get(chain)
            .copied()
            .ok_or_else(|| Error::InsufficientKeyMaterial(format!("no derivation family known for chain {}", chain)))
    }

    /// Return the key for `chain`, deriving it on the first request only
    pub fn derive_private_key(&self, chain: &str) -> Result<PrivateKey> {
        let family = self.family_of(chain)?;

        if let Some(key) = self.read_cache().get(chain) {
            debug!(chain, "key cache hit");
            return Ok(key.clone());
        }

        debug!(chain, path = family.derivation_path(), "deriving key");
        let path: DerivationPath = family.derivation_path().parse()?;
        let key = derive_private_key(&self.seed_bytes[..], &path, family)?;

        let mut cache = self.cache.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(cache.entry(chain.to_string()).or_insert(key).clone())
    }

    /// Derive (or fetch) keys for every known chain. Explicit export only.
    pub fn export_all(&self) -> Result<BTreeMap<String, PrivateKey>> {
        self.chains
            .keys()
            .map(|chain| Ok((chain.clone(), self.derive_private_key(chain)?)))
            .collect()
    }

    /// The mnemonic phrase. Explicit export only.
    pub fn export_seed(&self) -> Zeroizing<String> {
        Zeroizing::new(self.seed.phrase().to_string())
    }

    /// Chains whose keys are currently cached
    pub fn cached_chains(&self) -> Vec<String> {
        let mut chains: Vec<String> = self.read_cache().keys().cloned().collect();
        chains.sort();
        chains
    }

    /// Drop every cached key. Dropped keys are zeroized.
    pub fn clear(&self) {
        let mut cache = self.cache.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        cache.clear();
        cache.shrink_to_fit();
    }

    fn read_cache(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, PrivateKey>> {
        self.cache.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyManager")
            .field("chains", &self.chains.keys().collect::<Vec<_>>())
            .field("cached", &self.cached_chains())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PHRASE: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn test_construction_validates_phrase() {
        let err = KeyManager::new("abandon abandon abandon").unwrap_err();
        assert!(matches!(err, Error::InvalidSeedPhrase(_)));
    }

    #[test]
    fn test_derivation_is_cached() {
        let manager = KeyManager::new(PHRASE).unwrap();
        assert!(manager.cached_chains().is_empty());

        let first = manager.derive_private_key("ethereum").unwrap();
        assert_eq!(manager.cached_chains(), vec!["ethereum".to_string()]);

        let second = manager.derive_private_key("ethereum").unwrap();
        assert_eq!(first, second);
        assert_eq!(manager.cached_chains().len(), 1);
    }

    #[test]
    fn test_known_private_key_vector() {
        let manager = KeyManager::new(PHRASE).unwrap();
        let key = manager.derive_private_key("ethereum").unwrap();
        assert_eq!(
            key.to_hex().as_str(),
            "1ab42cc412b618bdea3a599e3c9bae199ebf030895b039e9db1e30dafb12b727"
        );
    }

    #[test]
    fn test_evm_chains_share_a_key() {
        let manager = KeyManager::new(PHRASE).unwrap();
        assert_eq!(
            manager.derive_private_key("ethereum").unwrap(),
            manager.derive_private_key("polygon").unwrap()
        );
        assert_ne!(
            manager.derive_private_key("ethereum").unwrap().as_bytes(),
            manager.derive_private_key("bitcoin").unwrap().as_bytes()
        );
    }

    #[test]
    fn test_unknown_chain_is_insufficient_key_material() {
        let manager = KeyManager::new(PHRASE).unwrap();
        let err = manager.derive_private_key("solana").unwrap_err();
        assert!(matches!(err, Error::InsufficientKeyMaterial(_)));
    }

    #[test]
    fn test_clear_evicts_and_rederives_identically() {
        let manager = KeyManager::new(PHRASE).unwrap();
        let before = manager.derive_private_key("bitcoin").unwrap();

        manager.clear();
        assert!(manager.cached_chains().is_empty());

        let after = manager.derive_private_key("bitcoin").unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_passphrase_changes_keys() {
        let plain = KeyManager::new(PHRASE).unwrap();
        let salted = KeyManager::with_chains(
            PHRASE,
            Some("TREZOR"),
            plain.chains.clone(),
        )
        .unwrap();

        assert_ne!(
            plain.derive_private_key("ethereum").unwrap(),
            salted.derive_private_key("ethereum").unwrap()
        );
    }

    #[test]
    fn test_export_all_covers_every_chain() {
        let manager = KeyManager::new(PHRASE).unwrap();
        let keys = manager.export_all().unwrap();
        let chains: Vec<&str> = manager.chains().collect();
        assert_eq!(keys.keys().map(String::as_str).collect::<Vec<_>>(), chains);
        assert_eq!(manager.export_seed().as_str(), PHRASE);
    }

    #[test]
    fn test_debug_does_not_leak() {
        let manager = KeyManager::new(PHRASE).unwrap();
        manager.derive_private_key("ethereum").unwrap();
        let rendered = format!("{:?}", manager);
        assert!(!rendered.contains("abandon"));
        assert!(!rendered.contains("1ab42cc4"));
    }
}
