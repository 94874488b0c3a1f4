//! External Signing
//!
//! Keys never enter this crate. The unsigned PSBT goes to a wallet process
//! that prompts the user and answers with a signed PSBT, a cancellation, or
//! an error. The coordinator waits for that answer without a local timeout;
//! only the signer decides when a request is over.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::common::config::Network;
use crate::deposit::builder::UnsignedDeposit;
use crate::deposit::types::OwnedAddress;

/// Prompt shown by the wallet
pub const DEFAULT_SIGNING_MESSAGE: &str = "Sign VIA deposit transaction";

/// Inputs a given address must sign
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputsToSign {
    pub address: String,
    pub signing_indexes: Vec<usize>,
}

/// Request handed to the external signer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningRequest {
    /// "Mainnet" or "Testnet"
    pub network: String,
    /// Prompt shown to the user
    pub message: String,
    /// Unsigned PSBT, base64
    pub psbt_base64: String,
    pub inputs_to_sign: Vec<InputsToSign>,
    /// Always false: the pipeline broadcasts the transaction itself
    pub broadcast: bool,
}

impl SigningRequest {
    pub fn for_deposit(unsigned: &UnsignedDeposit, owner: &OwnedAddress, network: Network) -> Self {
        Self {
            network: network.signer_name().to_string(),
            message: DEFAULT_SIGNING_MESSAGE.to_string(),
            psbt_base64: unsigned.to_base64(),
            inputs_to_sign: vec![InputsToSign {
                address: owner.address.clone(),
                signing_indexes: unsigned.signing_indexes(),
            }],
            broadcast: false,
        }
    }
}

/// How a signing request ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SigningOutcome {
    /// Signed PSBT, base64
    Signed(String),
    /// User declined in the wallet
    Cancelled,
    /// Signer reported an error
    Failed(String),
}

/// An external process holding the depositor's keys
#[async_trait]
pub trait ExternalSigner: Send + Sync {
    /// Ask for signatures; may wait indefinitely on the user
    async fn sign(&self, request: &SigningRequest) -> SigningOutcome;

    /// Signer description for logs
    fn signer_type(&self) -> &'static str;
}

/// Hands unsigned deposits to an [`ExternalSigner`]
#[derive(Clone)]
pub struct SigningCoordinator {
    signer: Arc<dyn ExternalSigner>,
    network: Network,
}

impl SigningCoordinator {
    pub fn new(signer: Arc<dyn ExternalSigner>, network: Network) -> Self {
        Self { signer, network }
    }

    /// Request signatures for every input of `unsigned` from `owner`'s wallet
    pub async fn request_signature(
        &self,
        unsigned: &UnsignedDeposit,
        owner: &OwnedAddress,
    ) -> SigningOutcome {
        let request = SigningRequest::for_deposit(unsigned, owner, self.network);

        tracing::info!(
            signer = self.signer.signer_type(),
            address = %owner.address,
            inputs = ?request.inputs_to_sign[0].signing_indexes,
            "Waiting for external signature"
        );

        let outcome = self.signer.sign(&request).await;

        match &outcome {
            SigningOutcome::Signed(_) => tracing::info!("Signer returned signed PSBT"),
            SigningOutcome::Cancelled => tracing::warn!("Signing cancelled by user"),
            SigningOutcome::Failed(reason) => tracing::error!(%reason, "Signer failed"),
        }

        outcome
    }
}

impl std::fmt::Debug for SigningCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningCoordinator")
            .field("signer", &self.signer.signer_type())
            .field("network", &self.network)
            .finish()
    }
}

/// Reply from a wallet signing endpoint
#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum SignResponse {
    Success {
        #[serde(rename = "psbtBase64", alias = "psbt_base64")]
        psbt_base64: String,
    },
    Cancelled,
    Error {
        #[serde(default)]
        error: String,
    },
}

impl From<SignResponse> for SigningOutcome {
    fn from(response: SignResponse) -> Self {
        match response {
            SignResponse::Success { psbt_base64 } => SigningOutcome::Signed(psbt_base64),
            SignResponse::Cancelled => SigningOutcome::Cancelled,
            SignResponse::Error { error } if error.is_empty() => {
                SigningOutcome::Failed("unknown signer error".to_string())
            }
            SignResponse::Error { error } => SigningOutcome::Failed(error),
        }
    }
}

/// Wallet bridge reachable over HTTP (`POST {url}/sign`)
#[derive(Debug, Clone)]
pub struct HttpSigner {
    base_url: String,
    http_client: reqwest::Client,
}

impl HttpSigner {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ExternalSigner for HttpSigner {
    async fn sign(&self, request: &SigningRequest) -> SigningOutcome {
        let url = format!("{}/sign", self.base_url);

        let resp = match self.http_client.post(&url).json(request).send().await {
            Ok(resp) => resp,
            Err(e) => return SigningOutcome::Failed(format!("signer unreachable: {}", e)),
        };

        let status = resp.status();
        let body = match resp.text().await {
            Ok(body) => body,
            Err(e) => return SigningOutcome::Failed(format!("signer response: {}", e)),
        };

        match serde_json::from_str::<SignResponse>(&body) {
            Ok(response) => response.into(),
            Err(_) if !status.is_success() => {
                SigningOutcome::Failed(format!("signer returned {}: {}", status, body))
            }
            Err(e) => SigningOutcome::Failed(format!("malformed signer response: {}", e)),
        }
    }

    fn signer_type(&self) -> &'static str {
        "http-wallet"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> SigningOutcome {
        serde_json::from_str::<SignResponse>(json).unwrap().into()
    }

    #[test]
    fn test_response_variants() {
        assert_eq!(
            parse(r#"{"status":"success","psbtBase64":"cHNidP8="}"#),
            SigningOutcome::Signed("cHNidP8=".to_string())
        );
        assert_eq!(parse(r#"{"status":"cancelled"}"#), SigningOutcome::Cancelled);
        assert_eq!(
            parse(r#"{"status":"error","error":"device locked"}"#),
            SigningOutcome::Failed("device locked".to_string())
        );
        assert_eq!(
            parse(r#"{"status":"error"}"#),
            SigningOutcome::Failed("unknown signer error".to_string())
        );
    }

    #[test]
    fn test_request_wire_format() {
        let request = SigningRequest {
            network: "Testnet".to_string(),
            message: DEFAULT_SIGNING_MESSAGE.to_string(),
            psbt_base64: "cHNidP8=".to_string(),
            inputs_to_sign: vec![InputsToSign {
                address: "tb1qxyz".to_string(),
                signing_indexes: vec![0],
            }],
            broadcast: false,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["psbtBase64"], "cHNidP8=");
        assert_eq!(json["inputsToSign"][0]["signingIndexes"][0], 0);
        assert_eq!(json["broadcast"], false);
    }

    #[tokio::test]
    async fn test_unreachable_signer_fails() {
        let signer = HttpSigner::new("http://127.0.0.1:1/");
        assert_eq!(signer.base_url(), "http://127.0.0.1:1");

        let request = SigningRequest {
            network: "Testnet".to_string(),
            message: String::new(),
            psbt_base64: String::new(),
            inputs_to_sign: Vec::new(),
            broadcast: false,
        };

        assert!(matches!(signer.sign(&request).await, SigningOutcome::Failed(_)));
    }
}
