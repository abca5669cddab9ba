//! # Ledger Configuration
//!
//! Risk parameters, role identities and token listings, loaded from TOML.

use std::fs;
use std::path::Path;

use margin_core::{
    AccountId, LedgerError, LedgerResult, TokenId, BPS_DENOMINATOR, DEFAULT_HOLDING_FEE_BPS_PER_HOUR,
    DEFAULT_MAX_COMPENSATION_BPS, DEFAULT_MAX_LEVERAGE, MAX_TOKEN_DECIMALS, MIN_LEVERAGE,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::custody::Bank;
use crate::position::LedgerParams;

/// Errors raised while loading or saving configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config: {0}")]
    Invalid(#[from] LedgerError),
}

/// Ledger configuration loaded from TOML
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Highest leverage a position may open with
    #[serde(default = "default_max_leverage")]
    pub max_leverage: u32,

    /// Holding fee charged on close, in basis points per whole hour active
    #[serde(default = "default_holding_fee_bps_per_hour")]
    pub holding_fee_bps_per_hour: u32,

    /// Share of the paired token's surplus usable for withdrawal compensation
    #[serde(default = "default_max_compensation_bps")]
    pub max_compensation_bps: u32,

    /// Margin asset of the cross-margin namespace
    #[serde(default)]
    pub cross_base_asset: Option<TokenId>,

    /// Identities of the privileged actors
    pub roles: RoleConfig,

    /// Tokens the pool accepts
    pub tokens: Vec<TokenConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleConfig {
    /// Owner of the pool, the router allow-lists and the parameters
    pub admin: AccountId,
    /// Identity the pool uses toward its fee accumulator
    pub pool: AccountId,
    pub isolated_router: AccountId,
    pub cross_router: AccountId,
}

/// Configuration for an individual token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    pub id: TokenId,
    /// Token name for logging
    pub symbol: String,
    pub decimals: u8,
    pub paired_with: TokenId,
}

fn default_max_leverage() -> u32 {
    DEFAULT_MAX_LEVERAGE
}

fn default_holding_fee_bps_per_hour() -> u32 {
    DEFAULT_HOLDING_FEE_BPS_PER_HOUR
}

fn default_max_compensation_bps() -> u32 {
    DEFAULT_MAX_COMPENSATION_BPS
}

impl LedgerConfig {
    /// Load configuration from TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: LedgerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> LedgerResult<()> {
        if self.max_leverage < MIN_LEVERAGE || self.max_leverage > DEFAULT_MAX_LEVERAGE {
            return Err(LedgerError::InvalidParameter("max_leverage must be within 1..=100"));
        }
        if u128::from(self.holding_fee_bps_per_hour) > BPS_DENOMINATOR {
            return Err(LedgerError::InvalidParameter("holding_fee_bps_per_hour above 10000"));
        }
        if u128::from(self.max_compensation_bps) > BPS_DENOMINATOR {
            return Err(LedgerError::InvalidParameter("max_compensation_bps above 10000"));
        }
        self.roles.validate()?;

        if self.tokens.is_empty() {
            return Err(LedgerError::InvalidParameter("at least one token must be listed"));
        }
        for (index, token) in self.tokens.iter().enumerate() {
            if self.tokens[..index].iter().any(|other| other.id == token.id) {
                return Err(LedgerError::InvalidParameter("duplicate token id"));
            }
            token.validate()?;
            if self.token(token.paired_with).is_none() {
                return Err(LedgerError::InvalidParameter("paired token is not listed"));
            }
        }

        if let Some(base) = self.cross_base_asset {
            if self.token(base).is_none() {
                return Err(LedgerError::InvalidParameter("cross base asset is not listed"));
            }
        }
        Ok(())
    }

    pub fn params(&self) -> LedgerParams {
        LedgerParams {
            max_leverage: self.max_leverage,
            holding_fee_bps_per_hour: self.holding_fee_bps_per_hour,
        }
    }

    pub fn token(&self, id: TokenId) -> Option<&TokenConfig> {
        self.tokens.iter().find(|token| token.id == id)
    }

    pub fn token_by_symbol(&self, symbol: &str) -> Option<&TokenConfig> {
        self.tokens.iter().find(|token| token.symbol == symbol)
    }

    /// In-memory custody with every listed token registered
    pub fn bank(&self) -> LedgerResult<Bank> {
        let mut bank = Bank::new();
        for token in &self.tokens {
            bank.register_token(token.id, token.decimals)?;
        }
        Ok(bank)
    }
}

impl RoleConfig {
    fn validate(&self) -> LedgerResult<()> {
        let ids = [self.admin, self.pool, self.isolated_router, self.cross_router];
        for (index, id) in ids.iter().enumerate() {
            if ids[..index].contains(id) {
                return Err(LedgerError::InvalidParameter("role identities must be distinct"));
            }
        }
        Ok(())
    }
}

impl TokenConfig {
    fn validate(&self) -> LedgerResult<()> {
        if self.symbol.is_empty() {
            return Err(LedgerError::InvalidParameter("token symbol must not be empty"));
        }
        if self.decimals > MAX_TOKEN_DECIMALS {
            return Err(LedgerError::PrecisionOverflow);
        }
        if self.paired_with == self.id {
            return Err(LedgerError::InvalidParameter("token cannot pair with itself"));
        }
        Ok(())
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_leverage: DEFAULT_MAX_LEVERAGE,
            holding_fee_bps_per_hour: DEFAULT_HOLDING_FEE_BPS_PER_HOUR,
            max_compensation_bps: DEFAULT_MAX_COMPENSATION_BPS,
            cross_base_asset: Some(TokenId(2)),
            roles: RoleConfig {
                admin: AccountId(1),
                pool: AccountId(2),
                isolated_router: AccountId(3),
                cross_router: AccountId(4),
            },
            tokens: vec![
                TokenConfig {
                    id: TokenId(1),
                    symbol: "ETH".to_string(),
                    decimals: 18,
                    paired_with: TokenId(2),
                },
                TokenConfig {
                    id: TokenId(2),
                    symbol: "USDC".to_string(),
                    decimals: 6,
                    paired_with: TokenId(1),
                },
            ],
        }
    }
}
