//! # Ledger Snapshot
//!
//! Serializable copy of every record the ledger holds, for dumps and audits.

use margin_core::TokenId;
use serde::{Deserialize, Serialize};

use crate::cross::{CrossAccount, CrossLedger};
use crate::custody::Custody;
use crate::fees::{FeeKey, FeeState};
use crate::isolated::IsolatedLedger;
use crate::pool::{LiquidityPool, LiquiditySlot, TokenBalances, TokenListing};
use crate::position::Position;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEntry {
    pub token: TokenId,
    pub listing: TokenListing,
    pub balances: TokenBalances,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeEntry {
    pub key: FeeKey,
    pub state: FeeState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub tokens: Vec<TokenEntry>,
    pub slots: Vec<LiquiditySlot>,
    pub fees: Vec<FeeEntry>,
    pub positions: Vec<Position>,
    pub cross_base_asset: Option<TokenId>,
    pub cross_accounts: Vec<CrossAccount>,
    pub cross_positions: Vec<Position>,
}

impl LedgerSnapshot {
    pub fn capture<C: Custody>(pool: &LiquidityPool<C>, isolated: &IsolatedLedger, cross: &CrossLedger) -> Self {
        Self {
            tokens: pool
                .listings()
                .map(|(token, listing)| TokenEntry {
                    token,
                    listing,
                    balances: pool.balances(token),
                })
                .collect(),
            slots: pool.slots().copied().collect(),
            fees: pool
                .fees()
                .states()
                .map(|(key, state)| FeeEntry { key, state })
                .collect(),
            positions: isolated.positions().cloned().collect(),
            cross_base_asset: cross.base_asset().ok(),
            cross_accounts: cross.accounts().cloned().collect(),
            cross_positions: cross.positions().cloned().collect(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
