//! Key-holding helpers standing in for the wallet in unit tests

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bitcoin::hashes::Hash;
use bitcoin::key::{CompressedPublicKey, Keypair};
use bitcoin::secp256k1::{Message, Secp256k1, SecretKey};
use bitcoin::sighash::{EcdsaSighashType, Prevouts, SighashCache, TapSighashType};
use bitcoin::{Address, Psbt, ScriptBuf, TapTweakHash, TxOut, Txid};

use crate::deposit::types::{OwnedAddress, UnspentOutput};

pub(crate) fn secret(byte: u8) -> SecretKey {
    SecretKey::from_slice(&[byte; 32]).unwrap()
}

pub(crate) fn p2wpkh_owner(sk: &SecretKey) -> OwnedAddress {
    let secp = Secp256k1::new();
    let pk = CompressedPublicKey(sk.public_key(&secp));
    let address = Address::p2wpkh(&pk, bitcoin::Network::Testnet);
    OwnedAddress::new(&address.to_string(), &hex::encode(pk.to_bytes()))
}

pub(crate) fn p2tr_owner(sk: &SecretKey) -> OwnedAddress {
    let secp = Secp256k1::new();
    let (internal, _) = sk.x_only_public_key(&secp);
    let address = Address::p2tr(&secp, internal, None, bitcoin::Network::Testnet);
    OwnedAddress::new(&address.to_string(), &hex::encode(internal.serialize()))
}

pub(crate) fn funding_utxo(owner: &OwnedAddress, value: u64) -> UnspentOutput {
    UnspentOutput::new(
        Txid::from_byte_array([0xab; 32]),
        0,
        value,
        ScriptBuf::new(),
        &owner.address,
    )
}

/// Sign every input the way a wallet would, leaving finalization to the caller
pub(crate) fn sign_psbt(psbt: &mut Psbt, sk: &SecretKey) {
    let secp = Secp256k1::new();
    let prevouts: Vec<TxOut> = psbt
        .inputs
        .iter()
        .map(|input| input.witness_utxo.clone().unwrap())
        .collect();
    let mut cache = SighashCache::new(psbt.unsigned_tx.clone());

    for (index, prevout) in prevouts.iter().enumerate() {
        if prevout.script_pubkey.is_p2wpkh() {
            let sighash = cache
                .p2wpkh_signature_hash(
                    index,
                    &prevout.script_pubkey,
                    prevout.value,
                    EcdsaSighashType::All,
                )
                .unwrap();
            let msg = Message::from_digest(sighash.to_byte_array());
            let sig = bitcoin::ecdsa::Signature::sighash_all(secp.sign_ecdsa(&msg, sk));
            let pk = bitcoin::PublicKey::new(sk.public_key(&secp));
            psbt.inputs[index].partial_sigs.insert(pk, sig);
        } else {
            let sighash = cache
                .taproot_key_spend_signature_hash(
                    index,
                    &Prevouts::All(prevouts.as_slice()),
                    TapSighashType::Default,
                )
                .unwrap();
            let msg = Message::from_digest(sighash.to_byte_array());

            let keypair = Keypair::from_secret_key(&secp, sk);
            let (internal, _) = keypair.x_only_public_key();
            let tweak = TapTweakHash::from_key_and_tweak(internal, None);
            let tweaked = keypair.add_xonly_tweak(&secp, &tweak.to_scalar()).unwrap();
            let signature = secp.sign_schnorr_no_aux_rand(&msg, &tweaked);
            psbt.inputs[index].tap_key_sig = Some(bitcoin::taproot::Signature {
                signature,
                sighash_type: TapSighashType::Default,
            });
        }
    }
}

pub(crate) fn encode(psbt: &Psbt) -> String {
    STANDARD.encode(psbt.serialize())
}
