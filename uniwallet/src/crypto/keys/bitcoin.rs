//! Bitcoin address derivation and validation

use std::str::FromStr;

use bitcoin::{Address, PublicKey as BitcoinPublicKey};

use crate::error::{Error, Result};
use super::derivation::{ChainFamily, PrivateKey};
pub use bitcoin::Network;

/// The Bitcoin network a key family addresses
pub fn network_for(family: ChainFamily) -> Result<Network> {
    match family {
        ChainFamily::Bitcoin => Ok(Network::Bitcoin),
        ChainFamily::BitcoinTestnet => Ok(Network::Testnet),
        ChainFamily::Evm => Err(Error::KeyDerivation("Not a Bitcoin key family".to_string())),
    }
}

/// Get the native SegWit (P2WPKH) address of a Bitcoin private key
pub fn address_from_private_key(private_key: &PrivateKey) -> Result<Address> {
    let network = network_for(private_key.family())?;
    let public_key = BitcoinPublicKey::new(private_key.public_key()?);

    Address::p2wpkh(&public_key, network)
        .map_err(|e| Error::KeyDerivation(format!("Invalid Bitcoin public key: {}", e)))
}

/// Parse an address and require it to belong to `network`
pub fn parse_address(address: &str, network: Network) -> Result<Address> {
    Address::from_str(address)
        .map_err(|e| Error::AddressValidationFailure(format!("{}: {}", address, e)))?
        .require_network(network)
        .map_err(|_| Error::AddressValidationFailure(format!("{} is not a {} address", address, network)))
}

/// Format-only check for any standard address type on `network`
pub fn validate_address(address: &str, network: Network) -> bool {
    parse_address(address, network).is_ok()
}
