//! OP_RETURN Metadata Output
//!
//! The deposit carries the receiver's VIA address in an unspendable output:
//!
//! ```text
//! OP_RETURN <len> <payload>
//! ```
//!
//! The length prefix is a single direct-push byte, so payloads are capped at
//! [`MAX_DIRECT_PUSH`] bytes. The cap is enforced when a [`ReceiverId`] is
//! constructed; [`encode_op_return`] itself writes the bytes unchecked.

use std::fmt;

use bitcoin::opcodes::all::OP_RETURN;
use bitcoin::{Amount, ScriptBuf, TxOut};

/// Largest payload expressible with a single direct push opcode
pub const MAX_DIRECT_PUSH: usize = 75;

/// Receiver identity payload errors
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("payload is {0} bytes, direct push allows at most {MAX_DIRECT_PUSH}")]
    TooLong(usize),
}

/// Destination-chain receiver identity, bounded for a direct push
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverId(Vec<u8>);

impl ReceiverId {
    /// Wrap raw payload bytes
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, PayloadError> {
        if bytes.len() > MAX_DIRECT_PUSH {
            return Err(PayloadError::TooLong(bytes.len()));
        }
        Ok(Self(bytes))
    }

    /// Decode a hex receiver address, with or without `0x` prefix
    pub fn from_hex(s: &str) -> Result<Self, PayloadError> {
        let s = s.trim();
        let s = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        Self::from_bytes(hex::decode(s)?)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for ReceiverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0))
    }
}

/// Build the zero-value metadata output for `receiver`
pub fn encode_op_return(receiver: &ReceiverId) -> TxOut {
    let payload = receiver.as_bytes();

    let mut script = Vec::with_capacity(payload.len() + 2);
    script.push(OP_RETURN.to_u8());
    script.push(payload.len() as u8);
    script.extend_from_slice(payload);

    TxOut {
        value: Amount::ZERO,
        script_pubkey: ScriptBuf::from_bytes(script),
    }
}

/// Extract the payload of an `OP_RETURN <len> <payload>` script.
///
/// Returns `None` for any other script shape, including a length byte that
/// does not match the remaining bytes.
pub fn decode_op_return(script: &ScriptBuf) -> Option<&[u8]> {
    match script.as_bytes() {
        [op, len, payload @ ..] if *op == OP_RETURN.to_u8() && *len as usize == payload.len() => {
            Some(payload)
        }
        _ => None,
    }
}
