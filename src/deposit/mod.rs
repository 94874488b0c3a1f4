//! Bridge Deposit
//!
//! Moves BTC from a user's wallet into the bridge, tagged with the L2
//! receiver in an OP_RETURN output.
//!
//! # Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      DEPOSIT FLOW                               │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  1. Fetch UTXOs for the depositor's address                     │
//! │     └── Via: Esplora API                                        │
//! │                                                                 │
//! │  2. Select the first UTXO                                       │
//! │     └── None: funding error, nothing else runs                  │
//! │                                                                 │
//! │  3. Build PSBT                                                  │
//! │     └── Output 0: bridge address, deposit amount                │
//! │     └── Output 1: OP_RETURN <receiver id>                       │
//! │     └── Output 2: change, only when positive                    │
//! │                                                                 │
//! │  4. External wallet signs                                       │
//! │     └── Cancel: stop, no broadcast                              │
//! │                                                                 │
//! │  5. Finalize                                                    │
//! │     └── Verify signatures, build witnesses, extract tx          │
//! │                                                                 │
//! │  6. Broadcast once                                              │
//! │     └── Rejections are classified, never retried                │
//! │                                                                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use via_deposit::{DepositConfig, DepositPipeline, EsploraClient, HttpSigner, OwnedAddress};
//!
//! let config = DepositConfig::from_env()?;
//! let esplora = Arc::new(EsploraClient::new(&config.esplora_url));
//! let signer = Arc::new(HttpSigner::new(&config.signer_url));
//! let pipeline = DepositPipeline::new(config, esplora.clone(), signer, esplora);
//!
//! let receipt = pipeline.deposit(&OwnedAddress::new("tb1q...", "02...")).await?;
//! println!("{}", receipt.explorer_url);
//! ```

pub mod builder;
pub mod finalizer;
pub mod op_return;
pub mod pipeline;
pub mod selector;
pub mod signer;
pub mod types;

#[cfg(test)]
pub(crate) mod test_utils;

pub use builder::{compute_change, BuilderError, PsbtBuilder, UnsignedDeposit};
pub use finalizer::{FinalizeError, TransactionFinalizer};
pub use op_return::{decode_op_return, encode_op_return, PayloadError, ReceiverId, MAX_DIRECT_PUSH};
pub use pipeline::{Broadcaster, DepositPipeline, UtxoSource};
pub use selector::{select_utxo, SelectError};
pub use signer::{
    ExternalSigner, HttpSigner, InputsToSign, SigningCoordinator, SigningOutcome, SigningRequest,
};
pub use types::{DepositReceipt, FinalizedTransaction, OwnedAddress, SpendKey, UnspentOutput};
