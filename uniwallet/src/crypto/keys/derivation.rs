//! Common key derivation functionality

use std::fmt;
use std::str::FromStr;

use hmac::{Hmac, Mac};
use secp256k1::{PublicKey as Secp256k1PublicKey, Scalar, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use zeroize::Zeroizing;

use crate::error::{Error, Result};

const HARDENED: u32 = 0x8000_0000;

/// Chain families. Every chain in a family shares one derivation path and
/// one key/address scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChainFamily {
    /// Ethereum and EVM compatible chains
    Evm,
    /// Bitcoin mainnet
    Bitcoin,
    /// Bitcoin testnet
    BitcoinTestnet,
}

impl ChainFamily {
    /// The fixed BIP-32 path this family derives its key from
    pub fn derivation_path(&self) -> &'static str {
        match self {
            Self::Evm => "m/44'/60'/0'/0/0",
            Self::Bitcoin => "m/84'/0'/0'/0/0",
            Self::BitcoinTestnet => "m/84'/1'/0'/0/0",
        }
    }
}

/// A parsed BIP-32 derivation path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivationPath(Vec<u32>);

impl DerivationPath {
    pub fn indexes(&self) -> &[u32] {
        &self.0
    }
}

impl FromStr for DerivationPath {
    type Err = Error;

    fn from_str(path: &str) -> Result<Self> {
        let rest = path
            .strip_prefix("m/")
            .ok_or_else(|| Error::KeyDerivation(format!("Invalid derivation path: {}", path)))?;

        let mut result = Vec::new();
        for component in rest.split('/') {
            if component.is_empty() {
                continue;
            }

            let (digits, hardened) = match component.strip_suffix('\'') {
                Some(digits) => (digits, true),
                None => (component, false),
            };

            let index = digits
                .parse::<u32>()
                .ok()
                .filter(|index| *index < HARDENED)
                .ok_or_else(|| Error::KeyDerivation(format!("Invalid derivation path component: {}", component)))?;

            result.push(if hardened { index | HARDENED } else { index });
        }

        Ok(Self(result))
    }
}

/// A chain-scoped secp256k1 private key. The bytes are wiped on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey {
    bytes: Zeroizing<[u8; 32]>,
    family: ChainFamily,
}

impl PrivateKey {
    /// Create a private key from raw bytes, rejecting values outside the curve order
    pub fn new(bytes: [u8; 32], family: ChainFamily) -> Result<Self> {
        let bytes = Zeroizing::new(bytes);
        SecretKey::from_slice(&bytes[..])
            .map_err(|e| Error::KeyDerivation(format!("Invalid secret key: {}", e)))?;
        Ok(Self { bytes, family })
    }

    /// Get the raw private key bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    pub fn family(&self) -> ChainFamily {
        self.family
    }

    pub fn secret_key(&self) -> Result<SecretKey> {
        SecretKey::from_slice(&self.bytes[..])
            .map_err(|e| Error::KeyDerivation(format!("Invalid secret key: {}", e)))
    }

    pub fn public_key(&self) -> Result<Secp256k1PublicKey> {
        let secp = Secp256k1::signing_only();
        Ok(Secp256k1PublicKey::from_secret_key(&secp, &self.secret_key()?))
    }

    /// Explicit export as lowercase hex without prefix
    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(&self.bytes[..]))
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("family", &self.family)
            .field("bytes", &"<redacted>")
            .finish()
    }
}

/// Derive the secp256k1 private key at `path` from a BIP-39 seed
pub fn derive_private_key(seed: &[u8], path: &DerivationPath, family: ChainFamily) -> Result<PrivateKey> {
    let (mut secret_key, mut chain_code) = derive_master_key(seed)?;

    for index in path.indexes() {
        (secret_key, chain_code) = derive_child_key(&secret_key, &chain_code, *index)?;
    }

    PrivateKey::new(*secret_key, family)
}

type KeyMaterial = (Zeroizing<[u8; 32]>, Zeroizing<[u8; 32]>);

fn split_hmac(hmac: Hmac<Sha512>) -> KeyMaterial {
    let mut output = Zeroizing::new([0u8; 64]);
    output.copy_from_slice(&hmac.finalize().into_bytes());

    let mut key = Zeroizing::new([0u8; 32]);
    let mut chain_code = Zeroizing::new([0u8; 32]);

    key.copy_from_slice(&output[0..32]);
    chain_code.copy_from_slice(&output[32..64]);

    (key, chain_code)
}

/// Derive the master key from a seed
fn derive_master_key(seed: &[u8]) -> Result<KeyMaterial> {
    let mut hmac = Hmac::<Sha512>::new_from_slice(b"Bitcoin seed")
        .map_err(|_| Error::KeyDerivation("HMAC error".to_string()))?;

    hmac.update(seed);
    let (key, chain_code) = split_hmac(hmac);
    SecretKey::from_slice(&key[..])
        .map_err(|e| Error::KeyDerivation(format!("Invalid master key: {}", e)))?;

    Ok((key, chain_code))
}

/// Derive a child key from a parent key (BIP-32 CKDpriv)
fn derive_child_key(parent_key: &[u8; 32], parent_chain_code: &[u8; 32], index: u32) -> Result<KeyMaterial> {
    let parent_secret_key = SecretKey::from_slice(parent_key)
        .map_err(|e| Error::KeyDerivation(format!("Invalid parent key: {}", e)))?;

    let mut data = Zeroizing::new(Vec::with_capacity(37));

    if index >= HARDENED {
        data.push(0);
        data.extend_from_slice(parent_key);
    } else {
        let secp = Secp256k1::signing_only();
        let parent_public_key = Secp256k1PublicKey::from_secret_key(&secp, &parent_secret_key);
        data.extend_from_slice(&parent_public_key.serialize());
    }

    data.extend_from_slice(&index.to_be_bytes());

    let mut hmac = Hmac::<Sha512>::new_from_slice(parent_chain_code)
        .map_err(|_| Error::KeyDerivation("HMAC error".to_string()))?;

    hmac.update(&data);
    let (tweak, child_chain_code) = split_hmac(hmac);

    // child = IL + parent (mod n); IL >= n or a zero sum invalidates the index
    let tweak = Scalar::from_be_bytes(*tweak)
        .map_err(|_| Error::KeyDerivation(format!("Derived tweak out of range at index {}", index)))?;
    let child_secret_key = parent_secret_key
        .add_tweak(&tweak)
        .map_err(|e| Error::KeyDerivation(format!("Key addition error: {}", e)))?;

    Ok((Zeroizing::new(child_secret_key.secret_bytes()), child_chain_code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_derivation_path() {
        let path: DerivationPath = "m/44'/60'/0'/0/0".parse().unwrap();
        assert_eq!(
            path.indexes(),
            &[44 | HARDENED, 60 | HARDENED, HARDENED, 0, 0]
        );
    }

    #[test]
    fn test_parse_invalid_paths() {
        assert!("44'/60'".parse::<DerivationPath>().is_err());
        assert!("m/44'/x".parse::<DerivationPath>().is_err());
        assert!("m/2147483648".parse::<DerivationPath>().is_err());
    }

    #[test]
    fn test_family_paths_parse() {
        for family in [ChainFamily::Evm, ChainFamily::Bitcoin, ChainFamily::BitcoinTestnet] {
            assert_eq!(family.derivation_path().parse::<DerivationPath>().unwrap().indexes().len(), 5);
        }
    }

    #[test]
    fn test_bip32_vector_1() {
        // BIP-32 test vector 1, chain m/0'/1/2'/2/1000000000
        let seed = hex::decode("000102030405060708090a0b0c0d0e0f").unwrap();
        let path: DerivationPath = "m/0'/1/2'/2/1000000000".parse().unwrap();
        let key = derive_private_key(&seed, &path, ChainFamily::Bitcoin).unwrap();

        assert_eq!(
            hex::encode(key.as_bytes()),
            "471b76e389e528d6de6d816857e012c5455051cad6660850e58372a6c3e6e7c8"
        );
    }

    #[test]
    fn test_private_key_rejects_zero() {
        assert!(PrivateKey::new([0u8; 32], ChainFamily::Evm).is_err());
    }

    #[test]
    fn test_private_key_debug_is_redacted() {
        let key = PrivateKey::new([7u8; 32], ChainFamily::Evm).unwrap();
        let rendered = format!("{:?}", key);
        assert!(rendered.contains("redacted"));
        assert!(!rendered.contains("0707"));
    }
}
