//! Reentrancy protection for pool operations. A pool holds one status flag;
//! every state-changing entry point acquires it for its duration and a
//! nested entry while it is held fails with `Reentrancy`.

use margin_core::{LedgerError, LedgerResult};

// ============================================================================
// Reentrancy Status Types
// ============================================================================

/// Reentrancy guard status flags
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReentrancyStatus {
    /// Pool is unlocked and ready for operations
    #[default]
    Unlocked,
    /// Pool is locked due to ongoing operation
    Locked,
}

// ============================================================================
// Reentrancy Guard Manager
// ============================================================================

/// Reentrancy guard manager
pub struct ReentrancyGuard;

impl ReentrancyGuard {
    /// Acquire lock for pool operation
    pub fn acquire(status: &mut ReentrancyStatus) -> LedgerResult<()> {
        match *status {
            ReentrancyStatus::Unlocked => {
                *status = ReentrancyStatus::Locked;
                Ok(())
            }
            ReentrancyStatus::Locked => Err(LedgerError::Reentrancy),
        }
    }

    /// Release lock after operation completes
    pub fn release(status: &mut ReentrancyStatus) {
        *status = ReentrancyStatus::Unlocked;
    }

    pub fn is_locked(status: &ReentrancyStatus) -> bool {
        *status == ReentrancyStatus::Locked
    }
}
