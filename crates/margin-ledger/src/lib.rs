//! # Margin Ledger
//!
//! Pooled-liquidity ledger for leveraged positions. It provides:
//!
//! - A liquidity pool that custodies trader margin and LP deposits
//! - A fee accumulator that splits trading fees pro rata across LP slots
//! - Isolated-margin and cross-margin position ledgers
//! - An all-or-nothing settlement protocol between ledgers and the pool
//! - The [`Engine`] facade that rolls back failed calls

pub mod access;
pub mod config;
pub mod context;
pub mod cross;
pub mod custody;
pub mod engine;
pub mod fees;
pub mod isolated;
pub mod oracle;
pub mod pool;
pub mod position;
pub mod reentrancy;
pub mod settlement;
pub mod snapshot;

pub use config::{ConfigError, LedgerConfig, RoleConfig, TokenConfig};
pub use context::CallContext;
pub use cross::{CrossAccount, CrossExit, CrossLedger, NukeReport};
pub use custody::{Bank, Custody};
pub use engine::Engine;
pub use fees::{FeeAccumulator, FeeKey, FeeState};
pub use isolated::IsolatedLedger;
pub use oracle::{PriceOracle, StaticOracle};
pub use pool::{Compensation, LiquidityPool, LiquiditySlot, TokenBalances, WithdrawReceipt};
pub use position::{LedgerParams, OpenRequest, Position};
pub use settlement::{FeeSink, SettlementSink};
pub use snapshot::LedgerSnapshot;
