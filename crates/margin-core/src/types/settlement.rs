//! # Settlement Instructions
//!
//! Value-transfer instructions a ledger submits to the liquidity pool. A
//! batch is applied exactly once, all-or-nothing.

use serde::{Deserialize, Serialize};

use crate::types::ids::{AccountId, Pair, TokenId};

/// One value movement requested by a ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementUpdate {
    /// Pool liquidity paid out to `recipient`
    Payout {
        recipient: AccountId,
        token: TokenId,
        amount: u128,
    },
    /// Trader funds pulled into pool custody and booked as reserved margin
    Reserve {
        from: AccountId,
        token: TokenId,
        amount: u128,
    },
    /// Reserved margin becomes pool liquidity; no custody movement
    Release { token: TokenId, amount: u128 },
    /// Pool liquidity forwarded to the fee accumulator for `pair`
    Fee {
        pair: Pair,
        token: TokenId,
        amount: u128,
    },
}

impl SettlementUpdate {
    pub fn token(&self) -> TokenId {
        match self {
            SettlementUpdate::Payout { token, .. }
            | SettlementUpdate::Reserve { token, .. }
            | SettlementUpdate::Release { token, .. }
            | SettlementUpdate::Fee { token, .. } => *token,
        }
    }

    pub fn amount(&self) -> u128 {
        match self {
            SettlementUpdate::Payout { amount, .. }
            | SettlementUpdate::Reserve { amount, .. }
            | SettlementUpdate::Release { amount, .. }
            | SettlementUpdate::Fee { amount, .. } => *amount,
        }
    }
}

/// Builder for a single settlement batch; zero-amount legs are dropped
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettlementBatch {
    updates: Vec<SettlementUpdate>,
}

impl SettlementBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn payout(mut self, recipient: AccountId, token: TokenId, amount: u128) -> Self {
        if amount > 0 {
            self.updates.push(SettlementUpdate::Payout {
                recipient,
                token,
                amount,
            });
        }
        self
    }

    pub fn reserve(mut self, from: AccountId, token: TokenId, amount: u128) -> Self {
        if amount > 0 {
            self.updates.push(SettlementUpdate::Reserve { from, token, amount });
        }
        self
    }

    pub fn release(mut self, token: TokenId, amount: u128) -> Self {
        if amount > 0 {
            self.updates.push(SettlementUpdate::Release { token, amount });
        }
        self
    }

    pub fn fee(mut self, pair: Pair, token: TokenId, amount: u128) -> Self {
        if amount > 0 {
            self.updates.push(SettlementUpdate::Fee { pair, token, amount });
        }
        self
    }

    pub fn updates(&self) -> &[SettlementUpdate] {
        &self.updates
    }
}
