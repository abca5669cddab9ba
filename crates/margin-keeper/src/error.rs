//! Error types for the keeper service

use margin_core::LedgerError;
use margin_ledger::ConfigError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeeperError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Ledger config error: {0}")]
    LedgerConfig(#[from] ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type KeeperResult<T> = Result<T, KeeperError>;
