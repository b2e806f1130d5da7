//! Tests for key derivation

use std::collections::BTreeMap;

use uniwallet::crypto::keys::{bitcoin as btc, derive_private_key, ethereum, ChainFamily, DerivationPath, KeyManager};
use uniwallet::crypto::mnemonic::{self, MnemonicStrength, Seed};
use uniwallet::Error;

const PHRASE: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

#[test]
fn test_zero_entropy_reference_phrase() {
    let phrase = mnemonic::from_entropy(&[0u8; 16]).unwrap();
    assert_eq!(phrase, PHRASE);
    assert!(mnemonic::validate(&phrase));
    assert_eq!(mnemonic::to_entropy(&phrase).unwrap(), vec![0u8; 16]);
}

#[test]
fn test_generated_phrases_round_trip() {
    for strength in [MnemonicStrength::Words12, MnemonicStrength::Words24] {
        let seed = Seed::generate_with_strength(strength).unwrap();
        let entropy = mnemonic::to_entropy(seed.phrase()).unwrap();
        assert_eq!(mnemonic::from_entropy(&entropy).unwrap(), seed.phrase());
    }
}

#[test]
fn test_mutated_last_word_fails_validation() {
    let mutated = PHRASE.replace("about", "abandon");
    assert!(!mnemonic::validate(&mutated));
    assert!(!mnemonic::validate("abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon zzzz"));
}

#[test]
fn test_ethereum_key_derivation() {
    let manager = KeyManager::new(PHRASE).unwrap();
    let key = manager.derive_private_key("ethereum").unwrap();

    assert_eq!(key.family(), ChainFamily::Evm);
    assert_eq!(
        ethereum::address_from_private_key(&key).unwrap(),
        "0x9858EfFD232B4033E47d90003D41EC34EcaEda94"
    );
}

#[test]
fn test_bitcoin_key_derivation() {
    let manager = KeyManager::new(PHRASE).unwrap();
    let key = manager.derive_private_key("bitcoin").unwrap();

    assert_eq!(key.family(), ChainFamily::Bitcoin);
    assert_eq!(
        btc::address_from_private_key(&key).unwrap().to_string(),
        "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu"
    );
}

#[test]
fn test_derivation_is_deterministic_across_managers() {
    let first = KeyManager::new(PHRASE).unwrap();
    let second = KeyManager::new(PHRASE).unwrap();

    for chain in ["ethereum", "bitcoin", "bitcoin-testnet"] {
        assert_eq!(
            first.derive_private_key(chain).unwrap(),
            second.derive_private_key(chain).unwrap()
        );
    }
}

#[test]
fn test_distinct_phrases_yield_distinct_keys() {
    let other = Seed::generate().unwrap();
    let a = KeyManager::new(PHRASE).unwrap();
    let b = KeyManager::new(other.phrase()).unwrap();

    assert_ne!(
        a.derive_private_key("ethereum").unwrap(),
        b.derive_private_key("ethereum").unwrap()
    );
}

#[test]
fn test_custom_chain_table() {
    let mut chains = BTreeMap::new();
    chains.insert("sepolia".to_string(), ChainFamily::Evm);

    let manager = KeyManager::with_chains(PHRASE, None, chains).unwrap();
    assert_eq!(
        manager.derive_private_key("sepolia").unwrap(),
        KeyManager::new(PHRASE).unwrap().derive_private_key("ethereum").unwrap()
    );
    assert!(matches!(
        manager.derive_private_key("ethereum"),
        Err(Error::InsufficientKeyMaterial(_))
    ));
}

#[test]
fn test_explicit_path_derivation() {
    let seed = Seed::from_phrase(PHRASE).unwrap().to_seed_bytes(None).unwrap();
    let path: DerivationPath = ChainFamily::Evm.derivation_path().parse().unwrap();

    let key = derive_private_key(&seed[..], &path, ChainFamily::Evm).unwrap();
    assert_eq!(
        key.to_hex().as_str(),
        "1ab42cc412b618bdea3a599e3c9bae199ebf030895b039e9db1e30dafb12b727"
    );
}
