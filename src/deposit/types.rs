//! Deposit Data Types

use std::fmt;
use std::str::FromStr;

use bitcoin::key::CompressedPublicKey;
use bitcoin::secp256k1::{Secp256k1, XOnlyPublicKey};
use bitcoin::{Address, Amount, OutPoint, ScriptBuf, Transaction, Txid};
use serde::Deserialize;

use crate::deposit::builder::BuilderError;

/// A spendable output fetched for the depositor's address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnspentOutput {
    /// Funding transaction and output index
    pub outpoint: OutPoint,
    /// Value in satoshis
    pub value: Amount,
    /// Locking script; empty when the provider does not report it
    pub script_pubkey: ScriptBuf,
    /// Address that owns this output
    pub address: String,
}

impl UnspentOutput {
    pub fn new(txid: Txid, vout: u32, value_sats: u64, script_pubkey: ScriptBuf, address: &str) -> Self {
        Self {
            outpoint: OutPoint { txid, vout },
            value: Amount::from_sat(value_sats),
            script_pubkey,
            address: address.to_string(),
        }
    }
}

impl fmt::Display for UnspentOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} sats)", self.outpoint, self.value.to_sat())
    }
}

/// Wallet address and public key supplied by the external signer
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OwnedAddress {
    /// Address string as reported by the wallet
    pub address: String,
    /// Hex-encoded public key: 33-byte compressed (P2WPKH) or 32-byte x-only (P2TR)
    #[serde(rename = "publicKey", alias = "public_key")]
    pub public_key: String,
}

/// Spend type derived from the wallet public key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpendKey {
    /// Native segwit v0 key-hash spend
    P2wpkh(CompressedPublicKey),
    /// Taproot key-path spend, untweaked internal key
    P2tr(XOnlyPublicKey),
}

impl OwnedAddress {
    pub fn new(address: &str, public_key: &str) -> Self {
        Self {
            address: address.to_string(),
            public_key: public_key.to_string(),
        }
    }

    /// Parse the public key into the spend type it implies
    pub fn spend_key(&self) -> Result<SpendKey, BuilderError> {
        let bytes = hex::decode(self.public_key.trim())
            .map_err(|e| BuilderError::InvalidPublicKey(e.to_string()))?;

        match bytes.len() {
            33 => CompressedPublicKey::from_slice(&bytes)
                .map(SpendKey::P2wpkh)
                .map_err(|e| BuilderError::InvalidPublicKey(e.to_string())),
            32 => XOnlyPublicKey::from_slice(&bytes)
                .map(SpendKey::P2tr)
                .map_err(|e| BuilderError::InvalidPublicKey(e.to_string())),
            n => Err(BuilderError::InvalidPublicKey(format!(
                "expected 33 or 32 bytes, got {}",
                n
            ))),
        }
    }

    /// Locking script the wallet key can unlock
    pub fn locking_script(&self) -> Result<ScriptBuf, BuilderError> {
        Ok(match self.spend_key()? {
            SpendKey::P2wpkh(pk) => ScriptBuf::new_p2wpkh(&pk.wpubkey_hash()),
            SpendKey::P2tr(internal) => {
                let secp = Secp256k1::verification_only();
                ScriptBuf::new_p2tr(&secp, internal, None)
            }
        })
    }

    /// Parse the address for `network`
    pub fn checked_address(&self, network: bitcoin::Network) -> Result<Address, BuilderError> {
        Address::from_str(&self.address)
            .map_err(|e| BuilderError::InvalidAddress(e.to_string()))?
            .require_network(network)
            .map_err(|e| BuilderError::InvalidAddress(e.to_string()))
    }
}

/// Signed transaction ready for broadcast
#[derive(Debug, Clone)]
pub struct FinalizedTransaction {
    pub tx: Transaction,
    pub txid: Txid,
}

impl FinalizedTransaction {
    pub fn new(tx: Transaction) -> Self {
        let txid = tx.compute_txid();
        Self { tx, txid }
    }

    /// Raw transaction as lowercase hex
    pub fn to_hex(&self) -> String {
        bitcoin::consensus::encode::serialize_hex(&self.tx)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        bitcoin::consensus::encode::serialize(&self.tx)
    }
}

/// Outcome of a successful deposit
#[derive(Debug, Clone)]
pub struct DepositReceipt {
    /// Transaction id returned by the broadcast target
    pub txid: String,
    /// Raw transaction hex that was submitted
    pub tx_hex: String,
    /// Bridged amount
    pub amount: Amount,
    /// Fee paid
    pub fee: Amount,
    /// Change returned to the depositor, if any
    pub change: Option<Amount>,
    /// Explorer link for the transaction
    pub explorer_url: String,
}
