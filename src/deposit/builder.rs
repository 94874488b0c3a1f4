//! Deposit PSBT Builder
//!
//! Builds the unsigned deposit transaction and wraps it in a PSBT carrying the
//! spent output, so the wallet can sign without looking the prevout up.
//!
//! Output order is fixed:
//! 1. bridge address, deposit amount
//! 2. `OP_RETURN <receiver>`, zero value
//! 3. change to the depositor, only when strictly positive

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bitcoin::{
    absolute::LockTime, transaction::Version, Amount, Psbt, ScriptBuf, Sequence, Transaction, TxIn,
    TxOut, Witness,
};

use crate::common::config::DepositConfig;
use crate::deposit::op_return::encode_op_return;
use crate::deposit::types::{OwnedAddress, UnspentOutput};

/// Builds unsigned deposit PSBTs
#[derive(Debug, Clone)]
pub struct PsbtBuilder {
    config: DepositConfig,
}

impl PsbtBuilder {
    pub fn new(config: DepositConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DepositConfig {
        &self.config
    }

    /// Build the unsigned deposit PSBT spending `utxo`
    pub fn build_deposit(
        &self,
        utxo: &UnspentOutput,
        owner: &OwnedAddress,
    ) -> Result<UnsignedDeposit, BuilderError> {
        let network = self.config.network.bitcoin_network();
        let spend_script = owner.locking_script()?;

        if !utxo.script_pubkey.is_empty() && utxo.script_pubkey != spend_script {
            return Err(BuilderError::ScriptMismatch {
                outpoint: utxo.outpoint.to_string(),
            });
        }

        let input = TxIn {
            previous_output: utxo.outpoint,
            script_sig: ScriptBuf::new(),
            sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
            witness: Witness::new(),
        };

        let mut outputs = vec![
            TxOut {
                value: self.config.deposit_amount,
                script_pubkey: self.config.bridge_address.script_pubkey(),
            },
            encode_op_return(&self.config.receiver),
        ];

        // Underfunded inputs give zero or negative change; the output is
        // dropped rather than the build failing.
        let change = compute_change(utxo.value, self.config.deposit_amount, self.config.fee);
        let change = match change {
            Some(change) => {
                let change_address = owner.checked_address(network)?;
                outputs.push(TxOut {
                    value: change,
                    script_pubkey: change_address.script_pubkey(),
                });
                Some(change)
            }
            None => None,
        };

        let tx = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![input],
            output: outputs,
        };

        let mut psbt =
            Psbt::from_unsigned_tx(tx).map_err(|e| BuilderError::Psbt(e.to_string()))?;
        psbt.inputs[0].witness_utxo = Some(TxOut {
            value: utxo.value,
            script_pubkey: spend_script,
        });

        tracing::debug!(
            outpoint = %utxo.outpoint,
            input_sats = utxo.value.to_sat(),
            outputs = psbt.unsigned_tx.output.len(),
            change_sats = change.map(|c| c.to_sat()),
            "Built deposit PSBT"
        );

        Ok(UnsignedDeposit {
            psbt,
            input_value: utxo.value,
            fee: self.config.fee,
            change,
        })
    }
}

/// `input - amount - fee`, or `None` when that is not strictly positive
pub fn compute_change(input: Amount, amount: Amount, fee: Amount) -> Option<Amount> {
    input
        .checked_sub(amount)
        .and_then(|rest| rest.checked_sub(fee))
        .filter(|change| *change > Amount::ZERO)
}

/// Unsigned deposit ready for the external signer
#[derive(Debug, Clone)]
pub struct UnsignedDeposit {
    /// PSBT as sent for signing
    pub psbt: Psbt,
    /// Value of the spent output
    pub input_value: Amount,
    /// Configured fee
    pub fee: Amount,
    /// Change output value, if one was added
    pub change: Option<Amount>,
}

impl UnsignedDeposit {
    /// Indexes of inputs the depositor must sign
    pub fn signing_indexes(&self) -> Vec<usize> {
        (0..self.psbt.inputs.len()).collect()
    }

    /// Txid of the unsigned transaction (segwit spends keep it after signing)
    pub fn txid(&self) -> String {
        self.psbt.unsigned_tx.compute_txid().to_string()
    }

    /// Serialize for signing
    pub fn serialize(&self) -> Vec<u8> {
        self.psbt.serialize()
    }

    /// Base64 PSBT as exchanged with wallets
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.serialize())
    }
}

/// Builder errors
#[derive(Debug, thiserror::Error)]
pub enum BuilderError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("locking script of {outpoint} does not match the wallet key")]
    ScriptMismatch { outpoint: String },

    #[error("psbt construction failed: {0}")]
    Psbt(String),
}
