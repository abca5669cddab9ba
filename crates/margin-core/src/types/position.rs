//! # Position Types
//!
//! Direction, lifecycle status and exit bookkeeping shared by the isolated
//! and cross-margin ledgers.

use serde::{Deserialize, Serialize};

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

/// Position lifecycle: `Pending -> Active -> {Closed, Cancelled}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionStatus {
    Pending,
    Active,
    Closed,
    Cancelled,
}

impl PositionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PositionStatus::Closed | PositionStatus::Cancelled)
    }
}

/// Why a position left the Active/Pending state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitReason {
    Liquidation,
    /// Closed because another position of the same cross account was liquidated
    AccountLiquidation,
    TakeProfit,
    StopLoss,
    ManualClose,
    Cancelled,
}

/// Audit record written when a position reaches a terminal status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitRecord {
    pub reason: ExitReason,
    /// Oracle price at exit; `None` when no price was needed
    pub price: Option<u128>,
    /// Amount paid to the owner in the margin token
    pub payout: u128,
    /// Holding fee routed to the fee accumulator
    pub fee: u128,
    pub timestamp: i64,
}
