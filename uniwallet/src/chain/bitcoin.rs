//! Bitcoin chain adapter
//!
//! Talks to an Esplora-compatible explorer REST API. There is no persistent
//! connection, so `connect` only flips the state. Payments are native SegWit
//! (P2WPKH) transactions built and signed locally.

use std::cmp;
use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode::{serialize, serialize_hex, VarInt};
use bitcoin::hashes::{sha256d, Hash, HashEngine};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::transaction::Version;
use bitcoin::{Address, Amount, Network, OutPoint, PublicKey, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness};
use ethers::types::U256;
use secp256k1::{Message, Secp256k1};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::config::NetworkConfig;
use crate::crypto::keys::{bitcoin as btc_keys, PrivateKey};
use crate::error::{Error, Result};
use crate::transaction::amount::to_satoshis;
use crate::transaction::{parse_amount, PaymentRequest};
use super::types::{explorer_url, Balance, ChainAdapter, ConnectionState, FeeEstimate};

/// Outputs below this many sats are not relayed
pub const DUST_THRESHOLD: u64 = 546;

/// vsize of a one-input, two-output P2WPKH transaction
pub const TYPICAL_TX_VSIZE: u64 = 141;

const MESSAGE_PREFIX: &[u8] = b"\x18Bitcoin Signed Message:\n";

#[derive(Debug, Deserialize)]
struct AddressStats {
    funded_txo_sum: u64,
    spent_txo_sum: u64,
}

#[derive(Debug, Deserialize)]
struct AddressInfo {
    chain_stats: AddressStats,
    mempool_stats: AddressStats,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TxStatus {
    pub confirmed: bool,
    #[serde(default)]
    pub block_height: Option<u64>,
}

/// An unspent output as the explorer reports it
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Utxo {
    pub txid: String,
    pub vout: u32,
    pub value: u64,
    pub status: TxStatus,
}

#[derive(Debug, Deserialize)]
struct ExplorerTx {
    txid: String,
    #[serde(default)]
    fee: Option<u64>,
    status: TxStatus,
}

/// One entry of an address history
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionSummary {
    pub txid: String,
    pub confirmed: bool,
    pub block_height: Option<u64>,
    /// Fee in sats
    pub fee: Option<u64>,
}

/// Inputs chosen for a payment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub inputs: Vec<Utxo>,
    pub fee: u64,
    /// Zero when the remainder was dust and went to the fee
    pub change: u64,
}

/// P2WPKH virtual size estimate
pub fn estimate_vsize(inputs: usize, outputs: usize) -> u64 {
    11 + 68 * inputs as u64 + 31 * outputs as u64
}

fn positive_fee_rate(rate: u64) -> Result<u64> {
    if rate == 0 {
        return Err(Error::InvalidInput("Fee rate must be at least 1 sat/vB".to_string()));
    }
    Ok(rate)
}

/// Largest-first selection. Change is kept when it is at least [`DUST_THRESHOLD`].
pub fn select_utxos(mut utxos: Vec<Utxo>, amount: u64, fee_rate: u64) -> Result<Selection> {
    utxos.sort_by(|a, b| b.value.cmp(&a.value));

    let mut total: u64 = 0;
    for count in 1..=utxos.len() {
        total = total.saturating_add(utxos[count - 1].value);

        let fee_without_change = estimate_vsize(count, 1).saturating_mul(fee_rate);
        if total < amount.saturating_add(fee_without_change) {
            continue;
        }

        let fee_with_change = estimate_vsize(count, 2).saturating_mul(fee_rate);
        let change = total.saturating_sub(amount).saturating_sub(fee_with_change);

        let (fee, change) = if change >= DUST_THRESHOLD {
            (fee_with_change, change)
        } else {
            (total - amount, 0)
        };

        utxos.truncate(count);
        return Ok(Selection { inputs: utxos, fee, change });
    }

    Err(Error::TransactionFailure(format!(
        "insufficient funds: {} sats available, {} sats plus fees required",
        total, amount
    )))
}

/// Pick the rate for the largest target not above `target`, or the fastest available
pub fn fee_rate_for_target(estimates: &HashMap<String, f64>, target: u16) -> Option<u64> {
    let mut rates: Vec<(u16, f64)> = estimates
        .iter()
        .filter_map(|(blocks, rate)| Some((blocks.parse().ok()?, *rate)))
        .collect();
    rates.sort_by_key(|(blocks, _)| *blocks);

    let rate = rates
        .iter()
        .rev()
        .find(|(blocks, _)| *blocks <= target)
        .or_else(|| rates.first())
        .map(|(_, rate)| *rate)?;

    Some(cmp::max(rate.ceil() as u64, 1))
}

/// Double SHA-256 of the "Bitcoin Signed Message" envelope
pub fn signed_message_hash(message: &[u8]) -> [u8; 32] {
    let mut engine = sha256d::Hash::engine();
    engine.input(MESSAGE_PREFIX);
    engine.input(&serialize(&VarInt(message.len() as u64)));
    engine.input(message);
    sha256d::Hash::from_engine(engine).to_byte_array()
}

/// Bitcoin adapter
pub struct BitcoinAdapter {
    chain: String,
    network: NetworkConfig,
    btc_network: Network,
    base_url: String,
    client: reqwest::Client,
    key: PrivateKey,
    public_key: PublicKey,
    address: Address,
    address_string: String,
    state: ConnectionState,
}

impl BitcoinAdapter {
    pub fn new(
        chain: impl Into<String>,
        private_key: &PrivateKey,
        network: NetworkConfig,
        rpc_override: Option<&str>,
    ) -> Result<Self> {
        let chain = chain.into();
        let btc_network = btc_keys::network_for(private_key.family())
            .map_err(|_| Error::InsufficientKeyMaterial(format!("{} needs a Bitcoin key", chain)))?;

        let address = btc_keys::address_from_private_key(private_key)?;
        let base_url = rpc_override
            .unwrap_or(&network.rpc_url)
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            chain,
            btc_network,
            base_url,
            client: network.http_client()?,
            key: private_key.clone(),
            public_key: PublicKey::new(private_key.public_key()?),
            address_string: address.to_string(),
            address,
            network,
            state: ConnectionState::Disconnected,
        })
    }

    pub fn network(&self) -> Network {
        self.btc_network
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "explorer request");

        self.client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::connection(&self.chain, e))?
            .error_for_status()
            .map_err(|e| Error::connection(&self.chain, e))?
            .json::<T>()
            .await
            .map_err(|e| Error::connection(&self.chain, e))
    }

    async fn fee_rate(&self) -> Result<u64> {
        let estimates: HashMap<String, f64> = self.get_json("/fee-estimates").await?;
        let target = self.network.confirmation_target();

        fee_rate_for_target(&estimates, target)
            .ok_or_else(|| Error::connection(&self.chain, "explorer returned no fee estimates"))
    }

    pub async fn utxos(&self) -> Result<Vec<Utxo>> {
        self.require_connected()?;
        self.get_json(&format!("/address/{}/utxo", self.address_string)).await
    }

    /// Address history, most recent first as the explorer orders it
    pub async fn recent_transactions(&self) -> Result<Vec<TransactionSummary>> {
        self.require_connected()?;

        let txs: Vec<ExplorerTx> = self
            .get_json(&format!("/address/{}/txs", self.address_string))
            .await?;

        Ok(txs
            .into_iter()
            .map(|tx| TransactionSummary {
                txid: tx.txid,
                confirmed: tx.status.confirmed,
                block_height: tx.status.block_height,
                fee: tx.fee,
            })
            .collect())
    }

    fn ensure_native(&self, token: Option<&str>) -> Result<()> {
        match token {
            None => Ok(()),
            Some(token) if token.eq_ignore_ascii_case(&self.network.symbol) => Ok(()),
            Some(token) => Err(Error::UnsupportedToken {
                chain: self.chain.clone(),
                token: token.to_string(),
            }),
        }
    }

    /// Build the payment and sign every input with segwit v0 SIGHASH_ALL
    pub fn sign_transaction(&self, selection: &Selection, recipient: &Address, amount: u64) -> Result<Transaction> {
        let input = selection
            .inputs
            .iter()
            .map(|utxo| {
                let txid = Txid::from_str(&utxo.txid)
                    .map_err(|e| Error::TransactionFailure(format!("Invalid UTXO txid {}: {}", utxo.txid, e)))?;
                Ok(TxIn {
                    previous_output: OutPoint { txid, vout: utxo.vout },
                    script_sig: ScriptBuf::new(),
                    sequence: Sequence::MAX,
                    witness: Witness::new(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let own_script = self.address.script_pubkey();
        let mut output = vec![TxOut {
            value: Amount::from_sat(amount),
            script_pubkey: recipient.script_pubkey(),
        }];
        if selection.change > 0 {
            output.push(TxOut {
                value: Amount::from_sat(selection.change),
                script_pubkey: own_script.clone(),
            });
        }

        let mut tx = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input,
            output,
        };

        let secp = Secp256k1::signing_only();
        let secret_key = self.key.secret_key()?;
        let mut witnesses = Vec::with_capacity(selection.inputs.len());
        {
            let mut cache = SighashCache::new(&tx);
            for (index, utxo) in selection.inputs.iter().enumerate() {
                let sighash = cache
                    .p2wpkh_signature_hash(index, &own_script, Amount::from_sat(utxo.value), EcdsaSighashType::All)
                    .map_err(|e| Error::Signing(format!("Failed to compute sighash: {}", e)))?;

                let signature = secp.sign_ecdsa(&Message::from_digest(sighash.to_byte_array()), &secret_key);
                let mut signature = signature.serialize_der().to_vec();
                signature.push(EcdsaSighashType::All.to_u32() as u8);

                witnesses.push(Witness::from_slice(&[signature, self.public_key.to_bytes()]));
            }
        }

        for (input, witness) in tx.input.iter_mut().zip(witnesses) {
            input.witness = witness;
        }

        Ok(tx)
    }

    async fn broadcast(&self, raw_hex: String) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/tx", self.base_url))
            .body(raw_hex)
            .send()
            .await
            .map_err(|e| Error::TransactionFailure(format!("broadcast failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::TransactionFailure(format!("broadcast failed: {}", e)))?;

        if !status.is_success() {
            return Err(Error::TransactionFailure(format!(
                "explorer rejected transaction ({}): {}",
                status,
                body.trim()
            )));
        }

        Ok(body.trim().to_string())
    }
}

#[async_trait]
impl ChainAdapter for BitcoinAdapter {
    fn chain(&self) -> &str {
        &self.chain
    }

    fn state(&self) -> ConnectionState {
        self.state
    }

    async fn connect(&mut self) -> Result<()> {
        self.state = ConnectionState::Connected;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.state = ConnectionState::Disconnected;
    }

    fn address(&self) -> &str {
        &self.address_string
    }

    fn validate_address(&self, address: &str) -> bool {
        btc_keys::validate_address(address, self.btc_network)
    }

    #[instrument(skip(self), fields(chain = %self.chain))]
    async fn get_balance(&self, token: Option<&str>) -> Result<Balance> {
        self.require_connected()?;
        self.ensure_native(token)?;

        let info: AddressInfo = self
            .get_json(&format!("/address/{}", self.address_string))
            .await?;

        let funded = info.chain_stats.funded_txo_sum.saturating_add(info.mempool_stats.funded_txo_sum);
        let spent = info.chain_stats.spent_txo_sum.saturating_add(info.mempool_stats.spent_txo_sum);

        Ok(Balance {
            amount: U256::from(funded.saturating_sub(spent)),
            decimals: self.network.decimals,
            symbol: self.network.symbol.clone(),
        })
    }

    #[instrument(skip(self, request), fields(chain = %self.chain))]
    async fn estimate_fee(&self, request: &PaymentRequest) -> Result<FeeEstimate> {
        self.require_connected()?;
        self.ensure_native(request.token.as_deref())?;

        let fee_rate = match request.fees.fee_rate {
            Some(rate) => positive_fee_rate(rate)?,
            None => self.fee_rate().await?,
        };

        Ok(FeeEstimate {
            amount: U256::from(TYPICAL_TX_VSIZE.saturating_mul(fee_rate)),
            decimals: self.network.decimals,
            symbol: self.network.symbol.clone(),
            unit_price: U256::from(fee_rate),
            units: TYPICAL_TX_VSIZE,
        })
    }

    #[instrument(skip(self, request), fields(chain = %self.chain, to = %request.to))]
    async fn send_transaction(&self, request: &PaymentRequest) -> Result<String> {
        self.check_payment(request)?;
        self.ensure_native(request.token.as_deref())?;

        let recipient = btc_keys::parse_address(&request.to, self.btc_network)?;
        let amount = to_satoshis(parse_amount(&request.amount, self.network.decimals)?)?;
        if amount < DUST_THRESHOLD {
            return Err(Error::InvalidInput(format!(
                "{} sats is below the {} sat dust threshold",
                amount, DUST_THRESHOLD
            )));
        }

        let fee_rate = match request.fees.fee_rate {
            Some(rate) => positive_fee_rate(rate)?,
            None => self.fee_rate().await?,
        };

        let selection = select_utxos(self.utxos().await?, amount, fee_rate)?;
        debug!(inputs = selection.inputs.len(), fee = selection.fee, change = selection.change, "selected utxos");

        let tx = self.sign_transaction(&selection, &recipient, amount)?;
        let local_txid = tx.txid().to_string();

        let tx_id = self.broadcast(serialize_hex(&tx)).await?;
        if tx_id != local_txid {
            debug!(%local_txid, %tx_id, "explorer returned a different txid");
        }

        info!(%tx_id, "transaction submitted");
        Ok(tx_id)
    }

    /// "Bitcoin Signed Message" compact signature, base64
    fn sign_message(&self, message: &[u8]) -> Result<String> {
        let secp = Secp256k1::signing_only();
        let digest = Message::from_digest(signed_message_hash(message));
        let signature = secp.sign_ecdsa_recoverable(&digest, &self.key.secret_key()?);
        let (recovery_id, compact) = signature.serialize_compact();

        // Header 31..34 marks a compressed public key
        let mut bytes = Vec::with_capacity(65);
        bytes.push(31 + recovery_id.to_i32() as u8);
        bytes.extend_from_slice(&compact);

        Ok(BASE64.encode(bytes))
    }

    fn explorer_address_url(&self, address: &str) -> String {
        explorer_url(&self.network.explorer_url, "address", address)
    }

    fn explorer_tx_url(&self, txid: &str) -> String {
        explorer_url(&self.network.explorer_url, "tx", txid)
    }
}
