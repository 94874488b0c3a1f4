//! Deposit Pipeline
//!
//! Runs one deposit attempt end to end:
//! fetch UTXOs → select → build PSBT → external signature → finalize → broadcast.
//!
//! Stages run strictly in order and the first failure ends the attempt.
//! Each attempt owns its PSBT; nothing is shared between concurrent attempts,
//! and UTXOs are not reserved, so concurrent deposits from one wallet can pick
//! the same output and only the network will notice.

use std::sync::Arc;

use async_trait::async_trait;
use bitcoin::Address;
use tracing::Instrument;

use crate::common::config::DepositConfig;
use crate::common::error::{DepositError, Result};
use crate::common::logging::{generate_correlation_id, log_deposit_event, DepositStage};
use crate::deposit::builder::PsbtBuilder;
use crate::deposit::finalizer::TransactionFinalizer;
use crate::deposit::selector::select_utxo;
use crate::deposit::signer::{ExternalSigner, SigningCoordinator, SigningOutcome};
use crate::deposit::types::{DepositReceipt, OwnedAddress, UnspentOutput};
use crate::esplora::{BroadcastError, EsploraError};

/// Provider of spendable outputs
#[async_trait]
pub trait UtxoSource: Send + Sync {
    /// UTXOs owned by `address`; an empty list means no funds
    async fn fetch_utxos(
        &self,
        address: &Address,
    ) -> std::result::Result<Vec<UnspentOutput>, EsploraError>;
}

/// Broadcast target for finalized transactions
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Submit lowercase raw transaction hex; returns the txid
    async fn broadcast(&self, tx_hex: &str) -> std::result::Result<String, BroadcastError>;
}

/// Sequential deposit pipeline
pub struct DepositPipeline {
    config: DepositConfig,
    utxos: Arc<dyn UtxoSource>,
    signing: SigningCoordinator,
    broadcaster: Arc<dyn Broadcaster>,
    builder: PsbtBuilder,
    finalizer: TransactionFinalizer,
}

impl DepositPipeline {
    pub fn new(
        config: DepositConfig,
        utxos: Arc<dyn UtxoSource>,
        signer: Arc<dyn ExternalSigner>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Self {
        Self {
            signing: SigningCoordinator::new(signer, config.network),
            builder: PsbtBuilder::new(config.clone()),
            finalizer: TransactionFinalizer::new(),
            config,
            utxos,
            broadcaster,
        }
    }

    pub fn config(&self) -> &DepositConfig {
        &self.config
    }

    /// Deposit the configured amount from `owner`'s wallet into the bridge
    pub async fn deposit(&self, owner: &OwnedAddress) -> Result<DepositReceipt> {
        let id = generate_correlation_id();

        let span = tracing::info_span!("deposit", deposit_id = %id);
        let result = self.run(&id, owner).instrument(span).await;

        match &result {
            Ok(receipt) => tracing::info!(txid = %receipt.txid, "Deposit broadcast"),
            Err(e) => tracing::error!(code = e.error_code(), error = %e, "Deposit failed"),
        }

        result
    }

    async fn run(&self, id: &str, owner: &OwnedAddress) -> Result<DepositReceipt> {
        let network = self.config.network.bitcoin_network();

        // 1. Fetch
        let address = owner.checked_address(network)?;
        let utxos = self
            .utxos
            .fetch_utxos(&address)
            .await
            .map_err(|e| fail(id, DepositStage::FetchUtxos, DepositError::utxo_query(e.to_string())))?;
        log_deposit_event(
            DepositStage::FetchUtxos,
            id,
            serde_json::json!({ "address": owner.address, "count": utxos.len() }),
            None,
        );

        // 2. Select
        let selected = select_utxo(&utxos, self.config.required_total())
            .map_err(|_| fail(id, DepositStage::Select, DepositError::funding(&owner.address)))?;
        log_deposit_event(
            DepositStage::Select,
            id,
            serde_json::json!({
                "outpoint": selected.outpoint.to_string(),
                "value_sats": selected.value.to_sat(),
            }),
            None,
        );

        // 3. Build
        let unsigned = self
            .builder
            .build_deposit(selected, owner)
            .map_err(|e| fail(id, DepositStage::Build, e.into()))?;
        log_deposit_event(
            DepositStage::Build,
            id,
            serde_json::json!({
                "unsigned_txid": unsigned.txid(),
                "outputs": unsigned.psbt.unsigned_tx.output.len(),
                "change_sats": unsigned.change.map(|c| c.to_sat()),
            }),
            None,
        );

        // 4. Sign
        let signed = match self.signing.request_signature(&unsigned, owner).await {
            SigningOutcome::Signed(psbt) => psbt,
            SigningOutcome::Cancelled => {
                return Err(fail(id, DepositStage::Sign, DepositError::SigningRejected))
            }
            SigningOutcome::Failed(reason) => {
                return Err(fail(id, DepositStage::Sign, DepositError::SigningFailed(reason)))
            }
        };
        log_deposit_event(DepositStage::Sign, id, serde_json::json!({}), None);

        // 5. Finalize
        let finalized = self
            .finalizer
            .finalize(&unsigned.psbt, &signed)
            .map_err(|e| fail(id, DepositStage::Finalize, e.into()))?;
        let tx_hex = finalized.to_hex();
        log_deposit_event(
            DepositStage::Finalize,
            id,
            serde_json::json!({
                "txid": finalized.txid.to_string(),
                "vsize": finalized.tx.vsize(),
            }),
            None,
        );

        // 6. Broadcast, exactly once
        let txid = self
            .broadcaster
            .broadcast(&tx_hex)
            .await
            .map_err(|e| fail(id, DepositStage::Broadcast, e.into()))?;
        log_deposit_event(
            DepositStage::Broadcast,
            id,
            serde_json::json!({ "txid": txid }),
            None,
        );

        Ok(DepositReceipt {
            explorer_url: format!("{}{}", self.config.explorer_url, txid),
            txid,
            tx_hex,
            amount: self.config.deposit_amount,
            fee: self.config.fee,
            change: unsigned.change,
        })
    }
}

impl std::fmt::Debug for DepositPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DepositPipeline")
            .field("config", &self.config)
            .field("signing", &self.signing)
            .finish()
    }
}

/// Record a failed stage and pass the error through
fn fail(id: &str, stage: DepositStage, err: DepositError) -> DepositError {
    log_deposit_event(
        stage,
        id,
        serde_json::json!({}),
        Some((err.error_code(), &err.to_string())),
    );
    err
}
