//! PSBT Finalizer
//!
//! Turns the wallet's signed PSBT into a broadcastable transaction.
//!
//! The signed PSBT must describe exactly the transaction that was sent for
//! signing. Sighashes are computed from the prevouts of the *sent* PSBT, so a
//! signer cannot change the amounts being committed to. Every input must
//! carry a signature that verifies; otherwise nothing is finalized.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bitcoin::{
    ecdsa,
    hashes::Hash,
    psbt::Input,
    secp256k1::{self, Message, Secp256k1, XOnlyPublicKey},
    sighash::{Prevouts, SighashCache},
    taproot, Psbt, PublicKey, ScriptBuf, Transaction, TxOut, Witness,
};

use crate::deposit::types::FinalizedTransaction;

/// Signature found on an input, before verification
enum InputSignature {
    Ecdsa(PublicKey, ecdsa::Signature),
    Schnorr(taproot::Signature),
}

/// Finalizes signed deposit PSBTs
pub struct TransactionFinalizer {
    secp: Secp256k1<secp256k1::VerifyOnly>,
}

impl Default for TransactionFinalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TransactionFinalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TransactionFinalizer")
    }
}

impl TransactionFinalizer {
    pub fn new() -> Self {
        Self {
            secp: Secp256k1::verification_only(),
        }
    }

    /// Decode `signed_base64`, check it against `sent`, and finalize every input
    pub fn finalize(
        &self,
        sent: &Psbt,
        signed_base64: &str,
    ) -> Result<FinalizedTransaction, FinalizeError> {
        let bytes = STANDARD
            .decode(signed_base64.trim())
            .map_err(|e| FinalizeError::Decode(e.to_string()))?;
        let signed = Psbt::deserialize(&bytes).map_err(|e| FinalizeError::Decode(e.to_string()))?;

        self.finalize_psbt(sent, signed)
    }

    /// Finalize an already decoded signed PSBT
    pub fn finalize_psbt(
        &self,
        sent: &Psbt,
        mut signed: Psbt,
    ) -> Result<FinalizedTransaction, FinalizeError> {
        check_shape(sent, &signed)?;

        let prevouts = sent
            .inputs
            .iter()
            .enumerate()
            .map(|(index, input)| {
                input
                    .witness_utxo
                    .clone()
                    .ok_or(FinalizeError::MissingPrevout(index))
            })
            .collect::<Result<Vec<TxOut>, _>>()?;

        // Build every witness before touching the PSBT
        let witnesses = (0..signed.inputs.len())
            .map(|index| {
                self.input_witness(&signed.unsigned_tx, &signed.inputs[index], &prevouts, index)
            })
            .collect::<Result<Vec<Witness>, _>>()?;

        for ((input, witness), prevout) in signed.inputs.iter_mut().zip(witnesses).zip(prevouts) {
            clear_signing_fields(input);
            input.witness_utxo = Some(prevout);
            input.final_script_witness = Some(witness);
        }

        // Fee sanity is left to the network: an underfunded deposit is still
        // extracted and rejected on broadcast.
        let tx = signed.extract_tx_unchecked_fee_rate();
        let finalized = FinalizedTransaction::new(tx);

        tracing::debug!(
            txid = %finalized.txid,
            vsize = finalized.tx.vsize(),
            "Finalized deposit transaction"
        );

        Ok(finalized)
    }

    fn input_witness(
        &self,
        tx: &Transaction,
        input: &Input,
        prevouts: &[TxOut],
        index: usize,
    ) -> Result<Witness, FinalizeError> {
        let prevout = &prevouts[index];
        let incomplete = |reason: &str| FinalizeError::IncompleteWitness {
            index,
            reason: reason.to_string(),
        };

        match find_signature(input, &prevout.script_pubkey, index)? {
            InputSignature::Ecdsa(pk, sig) => {
                let sighash = SighashCache::new(tx)
                    .p2wpkh_signature_hash(
                        index,
                        &prevout.script_pubkey,
                        prevout.value,
                        sig.sighash_type,
                    )
                    .map_err(|e| incomplete(&e.to_string()))?;
                let msg = Message::from_digest(sighash.to_byte_array());

                self.secp
                    .verify_ecdsa(&msg, &sig.signature, &pk.inner)
                    .map_err(|_| incomplete("ecdsa signature does not verify"))?;

                Ok(Witness::from_slice(&[sig.to_vec(), pk.to_bytes()]))
            }
            InputSignature::Schnorr(sig) => {
                let output_key = XOnlyPublicKey::from_slice(&prevout.script_pubkey.as_bytes()[2..])
                    .map_err(|_| incomplete("invalid taproot output key"))?;
                let sighash = SighashCache::new(tx)
                    .taproot_key_spend_signature_hash(
                        index,
                        &Prevouts::All(prevouts),
                        sig.sighash_type,
                    )
                    .map_err(|e| incomplete(&e.to_string()))?;
                let msg = Message::from_digest(sighash.to_byte_array());

                self.secp
                    .verify_schnorr(&sig.signature, &msg, &output_key)
                    .map_err(|_| incomplete("schnorr signature does not verify"))?;

                Ok(Witness::from_slice(&[sig.to_vec()]))
            }
        }
    }
}

/// The signer may only add signatures; the transaction itself must be unchanged
fn check_shape(sent: &Psbt, signed: &Psbt) -> Result<(), FinalizeError> {
    let (a, b) = (&sent.unsigned_tx, &signed.unsigned_tx);

    if a.input.len() != b.input.len() || a.output.len() != b.output.len() {
        return Err(FinalizeError::ShapeMismatch(format!(
            "sent {} inputs / {} outputs, got {} / {}",
            a.input.len(),
            a.output.len(),
            b.input.len(),
            b.output.len()
        )));
    }
    if let Some(i) = (0..a.input.len()).find(|&i| a.input[i] != b.input[i]) {
        return Err(FinalizeError::ShapeMismatch(format!("input {} differs", i)));
    }
    if let Some(i) = (0..a.output.len()).find(|&i| a.output[i] != b.output[i]) {
        return Err(FinalizeError::ShapeMismatch(format!("output {} differs", i)));
    }
    if a != b {
        return Err(FinalizeError::ShapeMismatch(
            "version or lock time differs".to_string(),
        ));
    }

    Ok(())
}

/// Locate the signature for `input`, from a signer-supplied final witness or
/// from the partial signature fields
fn find_signature(
    input: &Input,
    script_pubkey: &ScriptBuf,
    index: usize,
) -> Result<InputSignature, FinalizeError> {
    let incomplete = |reason: &str| FinalizeError::IncompleteWitness {
        index,
        reason: reason.to_string(),
    };
    let final_items = input
        .final_script_witness
        .as_ref()
        .filter(|w| !w.is_empty())
        .map(|w| w.to_vec());

    if script_pubkey.is_p2wpkh() {
        if let Some(items) = final_items {
            return match items.as_slice() {
                [sig, pk] => {
                    let sig = ecdsa::Signature::from_slice(sig)
                        .map_err(|_| incomplete("malformed witness signature"))?;
                    let pk = PublicKey::from_slice(pk)
                        .map_err(|_| incomplete("malformed witness public key"))?;
                    if !owns_p2wpkh(&pk, script_pubkey) {
                        return Err(incomplete("witness key does not match spent output"));
                    }
                    Ok(InputSignature::Ecdsa(pk, sig))
                }
                _ => Err(incomplete("p2wpkh witness must have two items")),
            };
        }

        input
            .partial_sigs
            .iter()
            .find(|(pk, _)| owns_p2wpkh(pk, script_pubkey))
            .map(|(pk, sig)| InputSignature::Ecdsa(*pk, *sig))
            .ok_or_else(|| incomplete("no signature for the spending key"))
    } else if script_pubkey.is_p2tr() {
        if let Some(items) = final_items {
            return match items.as_slice() {
                [sig] => taproot::Signature::from_slice(sig)
                    .map(InputSignature::Schnorr)
                    .map_err(|_| incomplete("malformed witness signature")),
                _ => Err(incomplete("key-path witness must have one item")),
            };
        }

        input
            .tap_key_sig
            .map(InputSignature::Schnorr)
            .ok_or_else(|| incomplete("no taproot key signature"))
    } else {
        Err(FinalizeError::UnsupportedScript(index))
    }
}

/// Whether `pk` is the compressed key committed to by a P2WPKH `script_pubkey`
fn owns_p2wpkh(pk: &PublicKey, script_pubkey: &ScriptBuf) -> bool {
    pk.wpubkey_hash()
        .map(|hash| ScriptBuf::new_p2wpkh(&hash) == *script_pubkey)
        .unwrap_or(false)
}

/// Drop per-signer fields once the final witness is set
fn clear_signing_fields(input: &mut Input) {
    input.partial_sigs.clear();
    input.sighash_type = None;
    input.redeem_script = None;
    input.witness_script = None;
    input.bip32_derivation.clear();
    input.final_script_sig = None;
    input.tap_key_sig = None;
    input.tap_script_sigs.clear();
    input.tap_scripts.clear();
    input.tap_key_origins.clear();
    input.tap_internal_key = None;
    input.tap_merkle_root = None;
}

/// Finalizer errors
#[derive(Debug, thiserror::Error)]
pub enum FinalizeError {
    #[error("cannot decode signed psbt: {0}")]
    Decode(String),

    #[error("signed psbt does not match the one sent for signing: {0}")]
    ShapeMismatch(String),

    #[error("input {0} has no spent output attached")]
    MissingPrevout(usize),

    #[error("input {0} spends an unsupported script type")]
    UnsupportedScript(usize),

    #[error("input {index} lacks a usable signature: {reason}")]
    IncompleteWitness { index: usize, reason: String },
}

impl FinalizeError {
    /// Input index the failure is attributed to, if any
    pub fn input_index(&self) -> Option<usize> {
        match self {
            FinalizeError::IncompleteWitness { index, .. }
            | FinalizeError::MissingPrevout(index)
            | FinalizeError::UnsupportedScript(index) => Some(*index),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::DepositConfig;
    use crate::deposit::builder::{PsbtBuilder, UnsignedDeposit};
    use crate::deposit::test_utils::*;
    use bitcoin::Amount;

    fn build(owner: &crate::deposit::types::OwnedAddress, value: u64) -> UnsignedDeposit {
        PsbtBuilder::new(DepositConfig::testnet_default().unwrap())
            .build_deposit(&funding_utxo(owner, value), owner)
            .unwrap()
    }

    #[test]
    fn test_p2wpkh_finalization() {
        let sk = secret(1);
        let owner = p2wpkh_owner(&sk);
        let unsigned = build(&owner, 5_000);

        let mut signed = unsigned.psbt.clone();
        sign_psbt(&mut signed, &sk);

        let finalized = TransactionFinalizer::new()
            .finalize(&unsigned.psbt, &encode(&signed))
            .unwrap();

        let witness = &finalized.tx.input[0].witness;
        assert_eq!(witness.len(), 2);
        assert_eq!(witness.nth(1).unwrap(), hex::decode(&owner.public_key).unwrap().as_slice());
        // segwit spend: signing does not change the txid
        assert_eq!(finalized.txid.to_string(), unsigned.txid());
        assert_eq!(finalized.tx.output.len(), 3);
        assert_eq!(finalized.tx.output[2].value, Amount::from_sat(3_200));

        let decoded: Transaction =
            bitcoin::consensus::encode::deserialize(&finalized.to_bytes()).unwrap();
        assert_eq!(decoded, finalized.tx);
        assert_eq!(finalized.to_hex(), finalized.to_hex().to_lowercase());
    }

    #[test]
    fn test_p2tr_finalization() {
        let sk = secret(2);
        let owner = p2tr_owner(&sk);
        let unsigned = build(&owner, 10_000);

        let mut signed = unsigned.psbt.clone();
        sign_psbt(&mut signed, &sk);

        let finalized = TransactionFinalizer::new()
            .finalize(&unsigned.psbt, &encode(&signed))
            .unwrap();

        assert_eq!(finalized.tx.input[0].witness.len(), 1);
        assert_eq!(finalized.tx.input[0].witness.nth(0).unwrap().len(), 64);
    }

    #[test]
    fn test_unsigned_input_is_incomplete() {
        let owner = p2wpkh_owner(&secret(1));
        let unsigned = build(&owner, 5_000);

        let err = TransactionFinalizer::new()
            .finalize(&unsigned.psbt, &encode(&unsigned.psbt))
            .unwrap_err();

        assert!(matches!(err, FinalizeError::IncompleteWitness { index: 0, .. }));
        assert_eq!(err.input_index(), Some(0));
    }

    #[test]
    fn test_signature_from_wrong_key_rejected() {
        let owner_key = secret(1);
        let owner = p2wpkh_owner(&owner_key);
        let unsigned = build(&owner, 5_000);

        // Sign with another key, then file it under the owner's key
        let mut signed = unsigned.psbt.clone();
        sign_psbt(&mut signed, &secret(9));
        let (_, sig) = signed.inputs[0].partial_sigs.pop_first().unwrap();
        let owner_pk = PublicKey::new(owner_key.public_key(&Secp256k1::new()));
        signed.inputs[0].partial_sigs.insert(owner_pk, sig);

        let err = TransactionFinalizer::new()
            .finalize(&unsigned.psbt, &encode(&signed))
            .unwrap_err();
        assert!(matches!(err, FinalizeError::IncompleteWitness { index: 0, .. }));
    }

    #[test]
    fn test_signer_may_finalize_itself() {
        let sk = secret(1);
        let owner = p2wpkh_owner(&sk);
        let unsigned = build(&owner, 5_000);

        let mut signed = unsigned.psbt.clone();
        sign_psbt(&mut signed, &sk);
        let (pk, sig) = signed.inputs[0].partial_sigs.pop_first().unwrap();
        signed.inputs[0].final_script_witness =
            Some(Witness::from_slice(&[sig.to_vec(), pk.to_bytes()]));

        assert!(TransactionFinalizer::new()
            .finalize(&unsigned.psbt, &encode(&signed))
            .is_ok());
    }

    #[test]
    fn test_self_finalized_foreign_key_rejected() {
        let owner = p2wpkh_owner(&secret(1));
        let unsigned = build(&owner, 5_000);

        // Valid signature, but by a key that does not own the spent output
        let mut signed = unsigned.psbt.clone();
        sign_psbt(&mut signed, &secret(9));
        let (pk, sig) = signed.inputs[0].partial_sigs.pop_first().unwrap();
        signed.inputs[0].final_script_witness =
            Some(Witness::from_slice(&[sig.to_vec(), pk.to_bytes()]));

        let err = TransactionFinalizer::new()
            .finalize(&unsigned.psbt, &encode(&signed))
            .unwrap_err();
        assert!(matches!(
            err,
            FinalizeError::IncompleteWitness { index: 0, ref reason } if reason.contains("does not match")
        ));
    }

    #[test]
    fn test_tampered_output_rejected() {
        let sk = secret(1);
        let owner = p2wpkh_owner(&sk);
        let unsigned = build(&owner, 5_000);

        let mut signed = unsigned.psbt.clone();
        signed.unsigned_tx.output[2].value = Amount::from_sat(3_400);
        sign_psbt(&mut signed, &sk);

        let err = TransactionFinalizer::new()
            .finalize(&unsigned.psbt, &encode(&signed))
            .unwrap_err();
        assert!(matches!(err, FinalizeError::ShapeMismatch(_)));
    }

    #[test]
    fn test_dropped_output_rejected() {
        let owner = p2wpkh_owner(&secret(1));
        let unsigned = build(&owner, 5_000);

        let mut signed = unsigned.psbt.clone();
        signed.unsigned_tx.output.pop();
        signed.outputs.pop();

        let err = TransactionFinalizer::new()
            .finalize(&unsigned.psbt, &encode(&signed))
            .unwrap_err();
        assert!(matches!(err, FinalizeError::ShapeMismatch(_)));
    }

    #[test]
    fn test_garbage_rejected() {
        let owner = p2wpkh_owner(&secret(1));
        let unsigned = build(&owner, 5_000);
        let finalizer = TransactionFinalizer::new();

        assert!(matches!(
            finalizer.finalize(&unsigned.psbt, "not base64!"),
            Err(FinalizeError::Decode(_))
        ));
        assert!(matches!(
            finalizer.finalize(&unsigned.psbt, &STANDARD.encode(b"hello")),
            Err(FinalizeError::Decode(_))
        ));
    }

    #[test]
    fn test_underfunded_deposit_still_extracted() {
        let sk = secret(1);
        let owner = p2wpkh_owner(&sk);
        let unsigned = build(&owner, 1_000);

        let mut signed = unsigned.psbt.clone();
        sign_psbt(&mut signed, &sk);

        let finalized = TransactionFinalizer::new()
            .finalize(&unsigned.psbt, &encode(&signed))
            .unwrap();
        assert_eq!(finalized.tx.output.len(), 2);
    }
}
