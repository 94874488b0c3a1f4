//! UTXO Selection
//!
//! Picks the output that funds a deposit. The current policy takes the first
//! output the provider returned and does not compare its value against the
//! required total; an underfunded output surfaces later as a deposit without
//! change (and a transaction the network will refuse).

use bitcoin::Amount;

use crate::deposit::types::UnspentOutput;

/// Selection errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectError {
    #[error("insufficient funds: no spendable outputs")]
    NoUtxos,
}

/// Select the output funding a deposit of `required` sats (amount + fee)
pub fn select_utxo(utxos: &[UnspentOutput], required: Amount) -> Result<&UnspentOutput, SelectError> {
    let selected = utxos.first().ok_or(SelectError::NoUtxos)?;

    if selected.value < required {
        tracing::warn!(
            outpoint = %selected.outpoint,
            value_sats = selected.value.to_sat(),
            required_sats = required.to_sat(),
            "Selected UTXO does not cover deposit amount and fee"
        );
    }

    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::hashes::Hash;
    use bitcoin::{ScriptBuf, Txid};

    fn utxo(vout: u32, value: u64) -> UnspentOutput {
        UnspentOutput::new(Txid::all_zeros(), vout, value, ScriptBuf::new(), "tb1q")
    }

    #[test]
    fn test_empty_is_insufficient_funds() {
        assert_eq!(
            select_utxo(&[], Amount::from_sat(1_800)),
            Err(SelectError::NoUtxos)
        );
    }

    #[test]
    fn test_first_output_wins() {
        let utxos = vec![utxo(0, 500), utxo(1, 100_000)];
        let selected = select_utxo(&utxos, Amount::from_sat(1_800)).unwrap();
        assert_eq!(selected.outpoint.vout, 0);
    }

    #[test]
    fn test_underfunded_output_still_selected() {
        let utxos = vec![utxo(3, 1_000)];
        let selected = select_utxo(&utxos, Amount::from_sat(1_800)).unwrap();
        assert_eq!(selected.value, Amount::from_sat(1_000));
    }
}
