//! Via Bridge Deposit
//!
//! Client-side deposit into the Via bridge: pick a wallet UTXO, build a PSBT
//! paying the bridge with the L2 receiver in an OP_RETURN, have the user's
//! wallet sign it, finalize and broadcast.
//!
//! ## Modules
//!
//! - `common` - configuration, errors, logging
//! - `deposit` - selection, PSBT building, signing, finalization, pipeline
//! - `esplora` - UTXO lookup and broadcast over the Esplora API

pub mod common;
pub mod deposit;
pub mod esplora;

// Re-exports: infrastructure
pub use common::{ConfigError, DepositConfig, DepositError, Network};

// Re-exports: deposit pipeline
pub use deposit::{
    Broadcaster, DepositPipeline, DepositReceipt, ExternalSigner, HttpSigner, OwnedAddress,
    PsbtBuilder, ReceiverId, SigningOutcome, SigningRequest, TransactionFinalizer,
    UnspentOutput, UnsignedDeposit, UtxoSource,
};

// Re-exports: Esplora client
pub use esplora::{BroadcastError, EsploraClient, EsploraError, RejectReason};
