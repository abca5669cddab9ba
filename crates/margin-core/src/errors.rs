//! # Ledger Error Types
//!
//! Error taxonomy shared by every ledger component. Every externally
//! observable failure aborts the whole call; these variants say why.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{AccountId, PositionStatus, TokenId};

/// Kind of record an id refers to, used in `NotFound`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordKind {
    Position,
    CrossPosition,
    CrossAccount,
    Slot,
    Token,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RecordKind::Position => "position",
            RecordKind::CrossPosition => "cross position",
            RecordKind::CrossAccount => "cross account",
            RecordKind::Slot => "liquidity slot",
            RecordKind::Token => "token",
        };
        f.write_str(name)
    }
}

/// Ledger errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum LedgerError {
    // ========================================================================
    // State Machine Errors
    // ========================================================================

    /// Requested transition is not valid from the record's current status
    #[error("Invalid state: expected {expected:?}, found {actual:?}")]
    InvalidState {
        expected: PositionStatus,
        actual: PositionStatus,
    },

    /// One-shot configuration was already applied
    #[error("Already initialized: {0}")]
    AlreadyInitialized(&'static str),

    /// Exit, execution or liquidation condition does not hold at current prices
    #[error("Trigger not reached")]
    TriggerNotReached,

    // ========================================================================
    // Authorization Errors
    // ========================================================================

    #[error("Unauthorized caller {caller}")]
    Unauthorized { caller: AccountId },

    #[error("Reentrant call rejected")]
    Reentrancy,

    // ========================================================================
    // Balance Errors
    // ========================================================================

    #[error("Insufficient liquidity for token {token}: need {required}, have {available}")]
    InsufficientLiquidity {
        token: TokenId,
        required: u128,
        available: u128,
    },

    #[error("Insufficient fees: need {required}, have {available}")]
    InsufficientFees { required: u128, available: u128 },

    #[error("Insufficient balance: need {required}, have {available}")]
    InsufficientBalance { required: u128, available: u128 },

    // ========================================================================
    // Oracle and Math Errors
    // ========================================================================

    /// Oracle read failed or returned zero reserves
    #[error("Stale price")]
    StalePrice,

    /// Normalization or fixed-point math would overflow or lose precision
    #[error("Precision overflow")]
    PrecisionOverflow,

    // ========================================================================
    // Validation Errors
    // ========================================================================

    #[error("Invalid parameter: {0}")]
    InvalidParameter(&'static str),

    #[error("{kind} {id} not found")]
    NotFound { kind: RecordKind, id: u64 },
}

/// Result type using ledger errors
pub type LedgerResult<T> = Result<T, LedgerError>;

// Helper functions for creating specific errors
impl LedgerError {
    /// Create a status mismatch error
    pub fn state_mismatch(expected: PositionStatus, actual: PositionStatus) -> Self {
        Self::InvalidState { expected, actual }
    }

    /// Create a not found error
    pub fn not_found(kind: RecordKind, id: u64) -> Self {
        Self::NotFound { kind, id }
    }

    /// Create an insufficient liquidity error
    pub fn insufficient_liquidity(token: TokenId, required: u128, available: u128) -> Self {
        Self::InsufficientLiquidity {
            token,
            required,
            available,
        }
    }
}
