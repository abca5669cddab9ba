use std::fs;
use std::path::Path;

use margin_core::{AccountId, Direction, TokenId};
use margin_ledger::LedgerConfig;
use serde::{Deserialize, Serialize};

use crate::error::{KeeperError, KeeperResult};

/// Keeper configuration loaded from TOML file
///
/// Amounts and prices are whole token units; the driver scales them to wads.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KeeperConfig {
    /// Identity the keeper calls the ledger with
    pub keeper: AccountId,

    /// Wall-clock delay between ticks in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Ledger time that passes per tick, in seconds
    #[serde(default = "default_tick_seconds")]
    pub tick_seconds: i64,

    /// Pool, ledger and token setup
    pub ledger: LedgerConfig,

    /// Oracle pools and the price path each one follows
    pub markets: Vec<MarketConfig>,

    /// External balances credited before anything else
    #[serde(default)]
    pub funding: Vec<FundingConfig>,

    /// LP deposits seeded at start
    #[serde(default)]
    pub deposits: Vec<FundingConfig>,

    /// Cross-margin top-ups seeded at start
    #[serde(default)]
    pub margins: Vec<MarginConfig>,

    /// Trader orders seeded at start
    #[serde(default)]
    pub orders: Vec<OrderConfig>,
}

/// Configuration for individual oracle pool
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MarketConfig {
    /// Market name for logging
    pub name: String,
    pub base: TokenId,
    pub quote: TokenId,
    /// Base-side reserve depth
    pub depth: u64,
    /// Price of one base in quote before the first tick
    pub initial_price: u64,
    /// One price point per tick; the last point holds afterwards
    #[serde(default)]
    pub price_path: Vec<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FundingConfig {
    pub account: AccountId,
    pub token: TokenId,
    pub amount: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MarginConfig {
    pub account: AccountId,
    pub amount: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MarginMode {
    Isolated,
    Cross,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrderConfig {
    pub account: AccountId,
    pub mode: MarginMode,
    pub base: TokenId,
    pub quote: TokenId,
    pub direction: Direction,
    pub margin: u64,
    #[serde(default)]
    pub excess_margin: u64,
    pub leverage: u32,
    /// Limit price; market order when absent
    #[serde(default)]
    pub entry_price: Option<u64>,
    #[serde(default)]
    pub take_profit: Option<u64>,
    #[serde(default)]
    pub stop_loss: Option<u64>,
}

fn default_interval_ms() -> u64 {
    1_000
}

fn default_tick_seconds() -> i64 {
    3_600
}

impl KeeperConfig {
    /// Load configuration from TOML file
    pub fn load(path: impl AsRef<Path>) -> KeeperResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> KeeperResult<Self> {
        let config: KeeperConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> KeeperResult<()> {
        self.ledger.validate()?;

        let roles = self.ledger.roles;
        if [roles.admin, roles.pool, roles.isolated_router, roles.cross_router].contains(&self.keeper) {
            return Err(invalid("keeper must not reuse a ledger role identity"));
        }
        if self.interval_ms == 0 {
            return Err(invalid("interval_ms must be greater than 0"));
        }
        if self.tick_seconds <= 0 {
            return Err(invalid("tick_seconds must be greater than 0"));
        }
        if self.markets.is_empty() {
            return Err(invalid("at least one market is required"));
        }

        for market in &self.markets {
            market.validate(&self.ledger)?;
        }
        for funding in self.funding.iter().chain(&self.deposits) {
            self.ensure_listed(funding.token)?;
            if funding.amount == 0 {
                return Err(invalid("funding and deposit amounts must be positive"));
            }
        }
        if !self.margins.is_empty() && self.ledger.cross_base_asset.is_none() {
            return Err(invalid("cross margins need a cross_base_asset"));
        }
        for order in &self.orders {
            self.ensure_listed(order.base)?;
            self.ensure_listed(order.quote)?;
            if order.margin == 0 || order.leverage == 0 {
                return Err(invalid("orders need positive margin and leverage"));
            }
            if order.mode == MarginMode::Cross && Some(order.quote) != self.ledger.cross_base_asset {
                return Err(invalid("cross orders must be quoted in the cross base asset"));
            }
        }
        Ok(())
    }

    fn ensure_listed(&self, token: TokenId) -> KeeperResult<()> {
        match self.ledger.token(token) {
            Some(_) => Ok(()),
            None => Err(KeeperError::InvalidConfig(format!("token {} is not listed", token))),
        }
    }

    /// Number of ticks needed to walk every price path
    pub fn path_len(&self) -> usize {
        self.markets
            .iter()
            .map(|market| market.price_path.len())
            .max()
            .unwrap_or(0)
    }
}

impl MarketConfig {
    fn validate(&self, ledger: &LedgerConfig) -> KeeperResult<()> {
        if self.name.is_empty() {
            return Err(invalid("market name must not be empty"));
        }
        if self.base == self.quote {
            return Err(invalid("market base and quote must differ"));
        }
        if ledger.token(self.base).is_none() || ledger.token(self.quote).is_none() {
            return Err(KeeperError::InvalidConfig(format!("market {} uses an unlisted token", self.name)));
        }
        if self.depth == 0 || self.initial_price == 0 || self.price_path.contains(&0) {
            return Err(KeeperError::InvalidConfig(format!("market {} needs positive depth and prices", self.name)));
        }
        Ok(())
    }

    /// Price in effect at `tick` (1-based); tick 0 is the initial price
    pub fn price_at(&self, tick: usize) -> u64 {
        if tick == 0 {
            return self.initial_price;
        }
        self.price_path
            .get(tick - 1)
            .or(self.price_path.last())
            .copied()
            .unwrap_or(self.initial_price)
    }
}

fn invalid(message: &str) -> KeeperError {
    KeeperError::InvalidConfig(message.to_string())
}
