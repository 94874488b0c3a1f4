//! Common Infrastructure Module
//!
//! This module contains:
//! - Configuration loading from environment variables
//! - Structured logging setup
//! - The deposit error taxonomy

pub mod config;
pub mod error;
pub mod logging;

// Re-exports for convenience
pub use config::{ConfigError, DepositConfig, Network};
pub use error::{DepositError, Result};
pub use logging::{
    generate_correlation_id, init_from_config, init_logging, log_deposit_event, DepositStage,
    LogEvent, LogLevel, LoggingError,
};
