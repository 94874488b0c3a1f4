//! Environment-based Configuration for the VIA Deposit Pipeline
//!
//! Deployment constants (bridge address, deposit amount, fee, receiver id)
//! are loaded once and passed into the pipeline as a [`DepositConfig`] value.
//!
//! # Environment Variables
//!
//! ## Network Configuration
//! - `VIA_NETWORK` - "mainnet" or "testnet" (default: "testnet")
//! - `VIA_ESPLORA_URL` - Esplora API endpoint URL
//! - `VIA_EXPLORER_URL` - Transaction explorer URL prefix
//! - `VIA_SIGNER_URL` - External signer endpoint
//!
//! ## Bridge Parameters (required on mainnet)
//! - `VIA_BRIDGE_ADDRESS` - Bridge deposit address
//! - `VIA_L2_RECEIVER` - Hex-encoded receiver address on the VIA network
//!
//! ## Amounts
//! - `VIA_DEPOSIT_SATS` - Amount bridged per deposit (default: 1500)
//! - `VIA_FEE_SATS` - Flat transaction fee (default: 300)
//!
//! ## Optional Settings
//! - `VIA_LOG_LEVEL` - Logging level (debug, info, warn, error)
//! - `VIA_LOG_JSON` - Set to "1" to force JSON log output

use std::env;
use std::str::FromStr;

use bitcoin::{Address, Amount};
use thiserror::Error;

use crate::deposit::op_return::{PayloadError, ReceiverId};

/// Testnet bridge address used when `VIA_BRIDGE_ADDRESS` is unset
pub const TESTNET_BRIDGE_ADDRESS: &str =
    "tb1pgvfdm6mfam4kqtnsjudjfa9c4q83mc0a6w5qyz07ajqvyt4f25vsaywx9w";

/// Testnet receiver used when `VIA_L2_RECEIVER` is unset
pub const TESTNET_L2_RECEIVER: &str = "36615Cf349d7F6344891B1e7CA7C72883F5dc049";

pub const DEFAULT_DEPOSIT_SATS: u64 = 1_500;
pub const DEFAULT_FEE_SATS: u64 = 300;
pub const DEFAULT_SIGNER_URL: &str = "http://localhost:9100";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("invalid receiver id: {0}")]
    Receiver(#[from] PayloadError),
}

/// Bitcoin network the deposit is made on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
}

impl FromStr for Network {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" | "main" => Ok(Network::Mainnet),
            "testnet" | "test" => Ok(Network::Testnet),
            _ => Err(ConfigError::InvalidValue(
                "VIA_NETWORK".to_string(),
                format!("unknown network: {}", s),
            )),
        }
    }
}

impl Network {
    /// Get default Esplora API for this network
    pub fn default_esplora_api(&self) -> &'static str {
        match self {
            Network::Mainnet => "https://blockstream.info/api",
            Network::Testnet => "https://blockstream.info/testnet/api",
        }
    }

    /// Get default transaction explorer prefix for this network
    pub fn default_explorer(&self) -> &'static str {
        match self {
            Network::Mainnet => "https://mempool.space/tx/",
            Network::Testnet => "https://mempool.space/testnet/tx/",
        }
    }

    /// Get bitcoin network enum
    pub fn bitcoin_network(&self) -> bitcoin::Network {
        match self {
            Network::Mainnet => bitcoin::Network::Bitcoin,
            Network::Testnet => bitcoin::Network::Testnet,
        }
    }

    /// Network name as understood by the external signer
    pub fn signer_name(&self) -> &'static str {
        match self {
            Network::Mainnet => "Mainnet",
            Network::Testnet => "Testnet",
        }
    }
}

/// Fixed per-deployment deposit parameters
#[derive(Debug, Clone)]
pub struct DepositConfig {
    /// Network environment
    pub network: Network,

    /// Bridge address, checked against `network`
    pub bridge_address: Address,

    /// Receiver identity embedded in the OP_RETURN output
    pub receiver: ReceiverId,

    /// Amount sent to the bridge
    pub deposit_amount: Amount,

    /// Flat fee left to miners
    pub fee: Amount,

    /// Esplora API endpoint
    pub esplora_url: String,

    /// Explorer URL prefix for receipts
    pub explorer_url: String,

    /// External signer endpoint
    pub signer_url: String,

    /// Log level
    pub log_level: String,

    /// Force JSON log output
    pub log_json: bool,
}

impl DepositConfig {
    /// Build a configuration from explicit values, using network defaults for endpoints
    pub fn new(
        network: Network,
        bridge_address: &str,
        receiver_hex: &str,
        deposit_sats: u64,
        fee_sats: u64,
    ) -> Result<Self, ConfigError> {
        if deposit_sats == 0 {
            return Err(ConfigError::InvalidValue(
                "VIA_DEPOSIT_SATS".to_string(),
                "deposit amount must be non-zero".to_string(),
            ));
        }

        Ok(Self {
            network,
            bridge_address: parse_bridge_address(bridge_address, network)?,
            receiver: ReceiverId::from_hex(receiver_hex)?,
            deposit_amount: Amount::from_sat(deposit_sats),
            fee: Amount::from_sat(fee_sats),
            esplora_url: network.default_esplora_api().to_string(),
            explorer_url: network.default_explorer().to_string(),
            signer_url: DEFAULT_SIGNER_URL.to_string(),
            log_level: "info".to_string(),
            log_json: network == Network::Mainnet,
        })
    }

    /// Testnet deployment with the published bridge parameters
    pub fn testnet_default() -> Result<Self, ConfigError> {
        Self::new(
            Network::Testnet,
            TESTNET_BRIDGE_ADDRESS,
            TESTNET_L2_RECEIVER,
            DEFAULT_DEPOSIT_SATS,
            DEFAULT_FEE_SATS,
        )
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let network: Network = env::var("VIA_NETWORK")
            .unwrap_or_else(|_| "testnet".to_string())
            .parse()?;

        let bridge_address =
            get_required_or_testnet_default("VIA_BRIDGE_ADDRESS", TESTNET_BRIDGE_ADDRESS, network)?;
        let receiver =
            get_required_or_testnet_default("VIA_L2_RECEIVER", TESTNET_L2_RECEIVER, network)?;

        let deposit_sats = parse_sats_var("VIA_DEPOSIT_SATS", DEFAULT_DEPOSIT_SATS)?;
        let fee_sats = parse_sats_var("VIA_FEE_SATS", DEFAULT_FEE_SATS)?;

        let mut config = Self::new(network, &bridge_address, &receiver, deposit_sats, fee_sats)?;

        if let Ok(url) = env::var("VIA_ESPLORA_URL") {
            config.esplora_url = url;
        }
        if let Ok(url) = env::var("VIA_EXPLORER_URL") {
            config.explorer_url = url;
        }
        if let Ok(url) = env::var("VIA_SIGNER_URL") {
            config.signer_url = url;
        }
        if let Ok(level) = env::var("VIA_LOG_LEVEL") {
            config.log_level = level;
        }
        if let Ok(flag) = env::var("VIA_LOG_JSON") {
            config.log_json = flag == "1";
        }

        Ok(config)
    }

    /// Total the selected output is expected to cover
    pub fn required_total(&self) -> Amount {
        self.deposit_amount + self.fee
    }

    /// Log configuration summary
    pub fn print_summary(&self) {
        tracing::info!(
            network = ?self.network,
            bridge = %self.bridge_address,
            receiver = %self.receiver,
            deposit_sats = self.deposit_amount.to_sat(),
            fee_sats = self.fee.to_sat(),
            esplora = %self.esplora_url,
            signer = %self.signer_url,
            "Deposit configuration"
        );
    }
}

fn parse_bridge_address(address: &str, network: Network) -> Result<Address, ConfigError> {
    Address::from_str(address)
        .map_err(|e| ConfigError::InvalidValue("VIA_BRIDGE_ADDRESS".to_string(), e.to_string()))?
        .require_network(network.bitcoin_network())
        .map_err(|e| ConfigError::InvalidValue("VIA_BRIDGE_ADDRESS".to_string(), e.to_string()))
}

fn parse_sats_var(var_name: &str, default: u64) -> Result<u64, ConfigError> {
    match env::var(var_name) {
        Ok(value) => value.trim().parse().map_err(|_| {
            ConfigError::InvalidValue(var_name.to_string(), "must be an integer sat amount".to_string())
        }),
        Err(_) => Ok(default),
    }
}

/// Get required env var, or use default for testnet only
fn get_required_or_testnet_default(
    var_name: &str,
    testnet_default: &str,
    network: Network,
) -> Result<String, ConfigError> {
    match env::var(var_name) {
        Ok(value) => Ok(value),
        Err(_) => {
            if network == Network::Testnet {
                Ok(testnet_default.to_string())
            } else {
                Err(ConfigError::MissingEnvVar(var_name.to_string()))
            }
        }
    }
}
