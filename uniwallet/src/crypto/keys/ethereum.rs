//! Ethereum address derivation and validation

use ethers::types::Address;
use ethers::utils::to_checksum;
use secp256k1::PublicKey as Secp256k1PublicKey;
use sha3::{Digest, Keccak256};

use crate::error::{Error, Result};
use super::derivation::{ChainFamily, PrivateKey};

/// Get the EIP-55 checksummed address for an EVM private key
pub fn address_from_private_key(private_key: &PrivateKey) -> Result<String> {
    if private_key.family() != ChainFamily::Evm {
        return Err(Error::KeyDerivation("Not an EVM private key".to_string()));
    }

    public_key_to_address(&private_key.public_key()?)
}

/// Get the EIP-55 checksummed address for a secp256k1 public key
pub fn public_key_to_address(public_key: &Secp256k1PublicKey) -> Result<String> {
    let uncompressed = public_key.serialize_uncompressed();

    // Skip the first byte (0x04) and hash the rest
    let key_hash = keccak256(&uncompressed[1..]);

    Ok(to_checksum(&Address::from_slice(&key_hash[12..]), None))
}

/// Format-only address check. Mixed-case input must carry a valid EIP-55 checksum.
pub fn validate_address(address: &str) -> bool {
    let body = match address.strip_prefix("0x") {
        Some(body) if body.len() == 40 => body,
        _ => return false,
    };

    if !body.chars().all(|c| c.is_ascii_hexdigit()) {
        return false;
    }

    let has_lower = body.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = body.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper {
        return match body.to_ascii_lowercase().parse::<Address>() {
            Ok(parsed) => to_checksum(&parsed, None) == address,
            Err(_) => false,
        };
    }

    true
}

/// Calculate the Keccak-256 hash of data
fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}
