//! Deposit Error Types
//!
//! Every stage of the pipeline fails fast into a single [`DepositError`].

use thiserror::Error;

use crate::deposit::builder::BuilderError;
use crate::deposit::finalizer::FinalizeError;
use crate::esplora::BroadcastError;

/// Terminal outcome of a failed deposit attempt
#[derive(Debug, Error)]
pub enum DepositError {
    /// No spendable outputs for the depositor's address
    #[error("no spendable outputs for {address}; fund the wallet first")]
    Funding { address: String },

    /// The user declined in the wallet
    #[error("signing request rejected by user")]
    SigningRejected,

    /// The wallet reported an error
    #[error("signing failed: {0}")]
    SigningFailed(String),

    /// Signed PSBT does not decode or does not match what was sent
    #[error("malformed signed psbt: {0}")]
    MalformedSignedStructure(String),

    /// An input has no usable signature
    #[error("input {index} is not fully signed: {reason}")]
    IncompleteWitness { index: usize, reason: String },

    /// Broadcast target refused the transaction
    #[error("transaction rejected: {0}")]
    SubmissionRejected(#[from] BroadcastError),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(#[from] super::config::ConfigError),

    /// Deposit inputs could not be turned into a transaction
    #[error("cannot build deposit: {0}")]
    Build(#[from] BuilderError),

    /// UTXO provider could not be queried
    #[error("utxo query failed: {0}")]
    UtxoQuery(String),
}

impl DepositError {
    /// Create a funding error
    pub fn funding(address: impl Into<String>) -> Self {
        Self::Funding {
            address: address.into(),
        }
    }

    /// Create a UTXO query error
    pub fn utxo_query(msg: impl Into<String>) -> Self {
        Self::UtxoQuery(msg.into())
    }

    /// Whether the user chose to stop; callers should not retry automatically
    pub fn is_user_cancellation(&self) -> bool {
        matches!(self, DepositError::SigningRejected)
    }

    /// Get error code for callers presenting the failure
    pub fn error_code(&self) -> &'static str {
        match self {
            DepositError::Funding { .. } => "FUNDING_ERROR",
            DepositError::SigningRejected => "SIGNING_REJECTED",
            DepositError::SigningFailed(_) => "SIGNING_FAILED",
            DepositError::MalformedSignedStructure(_) => "MALFORMED_SIGNED_STRUCTURE",
            DepositError::IncompleteWitness { .. } => "INCOMPLETE_WITNESS",
            DepositError::SubmissionRejected(_) => "SUBMISSION_REJECTED",
            DepositError::Config(_) => "CONFIG_ERROR",
            DepositError::Build(_) => "BUILD_ERROR",
            DepositError::UtxoQuery(_) => "UTXO_QUERY_ERROR",
        }
    }
}

impl From<FinalizeError> for DepositError {
    fn from(err: FinalizeError) -> Self {
        match err {
            FinalizeError::IncompleteWitness { index, reason } => {
                DepositError::IncompleteWitness { index, reason }
            }
            FinalizeError::MissingPrevout(index) => DepositError::IncompleteWitness {
                index,
                reason: "no spent output attached".to_string(),
            },
            FinalizeError::UnsupportedScript(index) => DepositError::IncompleteWitness {
                index,
                reason: "unsupported script type".to_string(),
            },
            other => DepositError::MalformedSignedStructure(other.to_string()),
        }
    }
}

/// Result type alias using DepositError
pub type Result<T> = std::result::Result<T, DepositError>;
