//! Esplora API Client
//!
//! Fetches the depositor's UTXOs and submits the finalized transaction.
//! One submission per deposit: rejections are classified and returned,
//! never retried.

use std::str::FromStr;

use async_trait::async_trait;
use bitcoin::{Address, Txid};
use reqwest::Client;
use serde::Deserialize;

use crate::deposit::pipeline::{Broadcaster, UtxoSource};
use crate::deposit::types::UnspentOutput;

/// Esplora API endpoints
pub const MAINNET_URL: &str = "https://blockstream.info/api";
pub const TESTNET_URL: &str = "https://blockstream.info/testnet/api";

/// Esplora HTTP client
#[derive(Debug, Clone)]
pub struct EsploraClient {
    client: Client,
    base_url: String,
}

impl EsploraClient {
    /// Create a new client with custom URL
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Create a client for Bitcoin mainnet
    pub fn new_mainnet() -> Self {
        Self::new(MAINNET_URL)
    }

    /// Create a client for Bitcoin testnet
    pub fn new_testnet() -> Self {
        Self::new(TESTNET_URL)
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get address UTXOs, in the order Esplora reports them
    pub async fn get_address_utxos(
        &self,
        address: &Address,
    ) -> Result<Vec<UnspentOutput>, EsploraError> {
        let url = format!("{}/address/{}/utxo", self.base_url, address);
        let resp = self.client.get(&url).send().await?;

        if !resp.status().is_success() {
            return Err(EsploraError::AddressNotFound(address.to_string()));
        }

        let utxos: Vec<EsploraUtxo> = resp.json().await?;
        let script_pubkey = address.script_pubkey();
        let owner = address.to_string();

        utxos
            .into_iter()
            .map(|u| {
                let txid = Txid::from_str(&u.txid)
                    .map_err(|_| EsploraError::ParseError(format!("invalid txid {}", u.txid)))?;
                Ok(UnspentOutput::new(
                    txid,
                    u.vout,
                    u.value,
                    script_pubkey.clone(),
                    &owner,
                ))
            })
            .collect()
    }

    /// Broadcast a raw transaction
    pub async fn broadcast_tx(&self, tx_hex: &str) -> Result<String, BroadcastError> {
        let url = format!("{}/tx", self.base_url);
        let resp = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(tx_hex.to_string())
            .send()
            .await
            .map_err(BroadcastError::from_transport)?;

        if !resp.status().is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            return Err(BroadcastError::from_rejection(&error_text));
        }

        let txid = resp.text().await.map_err(BroadcastError::from_transport)?;
        Ok(txid.trim().to_string())
    }
}

#[async_trait]
impl UtxoSource for EsploraClient {
    async fn fetch_utxos(&self, address: &Address) -> Result<Vec<UnspentOutput>, EsploraError> {
        self.get_address_utxos(address).await
    }
}

#[async_trait]
impl Broadcaster for EsploraClient {
    async fn broadcast(&self, tx_hex: &str) -> Result<String, BroadcastError> {
        self.broadcast_tx(tx_hex).await
    }
}

/// Esplora UTXO response entry
#[derive(Debug, Deserialize)]
struct EsploraUtxo {
    txid: String,
    vout: u32,
    value: u64,
}

/// Esplora error types
#[derive(Debug, thiserror::Error)]
pub enum EsploraError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Address not found: {0}")]
    AddressNotFound(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Why a broadcast was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Inputs already spent or conflicting with the mempool
    DoubleSpend,
    /// Fee below relay or mempool minimum
    FeeRate,
    /// Transaction failed to decode or violates consensus/policy rules
    Malformed,
    Other,
}

impl RejectReason {
    /// Classify a node's rejection text
    pub fn classify(message: &str) -> Self {
        let msg = message.to_lowercase();

        if msg.contains("missingorspent")
            || msg.contains("mempool-conflict")
            || msg.contains("already spent")
            || msg.contains("double spend")
        {
            RejectReason::DoubleSpend
        } else if msg.contains("min relay fee")
            || msg.contains("mempool min fee")
            || msg.contains("insufficient fee")
            || msg.contains("fee not met")
        {
            RejectReason::FeeRate
        } else if msg.contains("decode failed")
            || msg.contains("bad-txns")
            || msg.contains("non-mandatory-script-verify")
            || msg.contains("mandatory-script-verify")
            || msg.contains("dust")
        {
            RejectReason::Malformed
        } else {
            RejectReason::Other
        }
    }
}

/// Broadcast failures
#[derive(Debug, thiserror::Error)]
pub enum BroadcastError {
    #[error("rejected ({reason:?}): {message}")]
    Rejected { reason: RejectReason, message: String },

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("network error: {0}")]
    Network(String),
}

impl BroadcastError {
    pub fn from_rejection(message: &str) -> Self {
        BroadcastError::Rejected {
            reason: RejectReason::classify(message),
            message: message.trim().to_string(),
        }
    }

    fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BroadcastError::Timeout(err.to_string())
        } else {
            BroadcastError::Network(err.to_string())
        }
    }

    /// Rejection class, if the target answered
    pub fn reason(&self) -> Option<RejectReason> {
        match self {
            BroadcastError::Rejected { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}
